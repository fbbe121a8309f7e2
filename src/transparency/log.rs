//! Privacy-preserving transparency log.
//!
//! Counts what the agent has observed and decided, without storing any
//! content, coordinates, screenshots or judge explanations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transparency statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of keyboard events processed
    keyboard_events: AtomicU64,
    /// Number of mouse events (clicks and moves) processed
    mouse_events: AtomicU64,
    /// Number of monitoring ticks evaluated
    ticks: AtomicU64,
    /// Number of interventions fired
    interventions: AtomicU64,
    /// Number of returns to calm after elevated stress
    calm_restorations: AtomicU64,
    /// Number of intent checks sent to the judge
    intent_checks: AtomicU64,
    /// Number of sustained intent mismatches reported
    intent_mismatches: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            keyboard_events: AtomicU64::new(0),
            mouse_events: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            interventions: AtomicU64::new(0),
            calm_restorations: AtomicU64::new(0),
            intent_checks: AtomicU64::new(0),
            intent_mismatches: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        // Carry totals over from previous sessions
        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "Could not load previous transparency stats");
        }

        log
    }

    pub fn record_keyboard_event(&self) {
        self.keyboard_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mouse_event(&self) {
        self.mouse_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intervention(&self) {
        self.interventions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_calm_restored(&self) {
        self.calm_restorations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intent_check(&self) {
        self.intent_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intent_mismatch(&self) {
        self.intent_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            keyboard_events: self.keyboard_events.load(Ordering::Relaxed),
            mouse_events: self.mouse_events.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            interventions: self.interventions.load(Ordering::Relaxed),
            calm_restorations: self.calm_restorations.load(Ordering::Relaxed),
            intent_checks: self.intent_checks.load(Ordering::Relaxed),
            intent_mismatches: self.intent_mismatches.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Keyboard events processed: {}\n\
             - Mouse events processed: {}\n\
             - Monitoring ticks: {}\n\
             - Interventions: {}\n\
             - Calm restorations: {}\n\
             - Intent checks: {}\n\
             - Intent mismatches: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No key content captured\n\
             - Cursor positions used in memory for distance only, never stored\n\
             - Screenshots judged locally and discarded immediately\n\
             - Only counts and timing retained",
            stats.keyboard_events,
            stats.mouse_events,
            stats.ticks,
            stats.interventions,
            stats.calm_restorations,
            stats.intent_checks,
            stats.intent_mismatches,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                keyboard_events: stats.keyboard_events,
                mouse_events: stats.mouse_events,
                ticks: stats.ticks,
                interventions: stats.interventions,
                calm_restorations: stats.calm_restorations,
                intent_checks: stats.intent_checks,
                intent_mismatches: stats.intent_mismatches,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.keyboard_events
                    .store(persisted.keyboard_events, Ordering::Relaxed);
                self.mouse_events
                    .store(persisted.mouse_events, Ordering::Relaxed);
                self.ticks.store(persisted.ticks, Ordering::Relaxed);
                self.interventions
                    .store(persisted.interventions, Ordering::Relaxed);
                self.calm_restorations
                    .store(persisted.calm_restorations, Ordering::Relaxed);
                self.intent_checks
                    .store(persisted.intent_checks, Ordering::Relaxed);
                self.intent_mismatches
                    .store(persisted.intent_mismatches, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.keyboard_events,
            &self.mouse_events,
            &self.ticks,
            &self.interventions,
            &self.calm_restorations,
            &self.intent_checks,
            &self.intent_mismatches,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub keyboard_events: u64,
    pub mouse_events: u64,
    pub ticks: u64,
    pub interventions: u64,
    pub calm_restorations: u64,
    pub intent_checks: u64,
    pub intent_mismatches: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    keyboard_events: u64,
    mouse_events: u64,
    #[serde(default)]
    ticks: u64,
    #[serde(default)]
    interventions: u64,
    #[serde(default)]
    calm_restorations: u64,
    #[serde(default)]
    intent_checks: u64,
    #[serde(default)]
    intent_mismatches: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_keyboard_event();
        log.record_keyboard_event();
        log.record_mouse_event();
        log.record_tick();
        log.record_intervention();
        log.record_intent_check();

        let stats = log.stats();
        assert_eq!(stats.keyboard_events, 2);
        assert_eq!(stats.mouse_events, 1);
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.interventions, 1);
        assert_eq!(stats.intent_checks, 1);
        assert_eq!(stats.intent_mismatches, 0);
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        for _ in 0..5 {
            log.record_keyboard_event();
            log.record_calm_restored();
        }
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.keyboard_events, 0);
        assert_eq!(stats.calm_restorations, 0);
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Keyboard events"));
        assert!(summary.contains("Interventions"));
        assert!(summary.contains("Privacy Guarantee"));
        assert!(summary.contains("No key content captured"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = std::env::temp_dir().join(format!("sati-transparency-{}", uuid::Uuid::new_v4()));
        let path = dir.join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_intervention();
        log.record_intent_mismatch();
        log.save().unwrap();

        let restored = TransparencyLog::with_persistence(path);
        let stats = restored.stats();
        assert_eq!(stats.interventions, 1);
        assert_eq!(stats.intent_mismatches, 1);

        std::fs::remove_dir_all(dir).ok();
    }
}
