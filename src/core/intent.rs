//! Intent-reality tracking.
//!
//! The user declares what they mean to be working on. On a slow cadence the
//! tracker captures visual context, asks a judge whether it matches the
//! declared intent, and reports a mismatch once the user has been off task
//! for longer than the configured threshold.
//!
//! A check is split into [`IntentMismatchTracker::begin_check`] and
//! [`IntentMismatchTracker::complete_check`] so the (possibly slow) judge
//! call runs without holding the tracker's lock. Results that arrive after
//! the tracker was stopped or the intent changed are discarded.

use crate::config::IntentConfig;
use crate::error::{positive_seconds, EngineError, JudgeError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Explanation recorded when the judge could not be reached.
pub const FAIL_OPEN_EXPLANATION: &str = "Could not analyze";

/// Judge decision for one visual context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub matches: bool,
    pub explanation: String,
}

impl Verdict {
    pub fn matching(explanation: impl Into<String>) -> Self {
        Self {
            matches: true,
            explanation: explanation.into(),
        }
    }

    pub fn mismatching(explanation: impl Into<String>) -> Self {
        Self {
            matches: false,
            explanation: explanation.into(),
        }
    }
}

/// Decides whether a visual context matches a declared intent.
pub trait IntentJudge: Send + Sync {
    fn judge(&self, intent: &str, visual_context: &[u8]) -> Result<Verdict, JudgeError>;
}

/// Supplies the visual context (an encoded screenshot) for a check.
pub trait ContextSource: Send + Sync {
    /// `None` when nothing could be captured.
    fn capture(&self) -> Option<Vec<u8>>;
}

/// Fired when a mismatch has lasted at least the configured threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchEvent {
    pub intent: String,
    pub explanation: String,
    pub at: DateTime<Utc>,
}

/// Validated tracker settings.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentSettings {
    check_interval: Duration,
    mismatch_threshold: Duration,
}

impl IntentSettings {
    pub fn new(check_interval_secs: f64, mismatch_threshold_minutes: f64) -> Result<Self, EngineError> {
        let check_interval = positive_seconds(
            check_interval_secs,
            "intent check interval",
            EngineError::InvalidInterval,
        )?;
        let mismatch_threshold = positive_seconds(
            mismatch_threshold_minutes * 60.0,
            "mismatch threshold",
            EngineError::InvalidThreshold,
        )?;
        Ok(Self {
            check_interval,
            mismatch_threshold,
        })
    }

    pub fn from_config(config: &IntentConfig) -> Result<Self, EngineError> {
        Self::new(
            config.check_interval.as_secs_f64(),
            config.mismatch_threshold_minutes as f64,
        )
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn mismatch_threshold(&self) -> Duration {
        self.mismatch_threshold
    }
}

/// Snapshot of the tracker, safe to hand to the UI surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentState {
    /// Declared intent; empty when none is set
    pub current_intent: String,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_match: bool,
    /// Judge explanation for the last check (kept in memory only)
    pub last_explanation: String,
    /// Seconds the current mismatch has lasted
    pub mismatch_duration: f64,
    pub is_enabled: bool,
}

/// Work handed out by [`IntentMismatchTracker::begin_check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCheck {
    pub intent: String,
    pub at: DateTime<Utc>,
    generation: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    intent: String,
    last_check: Option<DateTime<Utc>>,
    last_match: bool,
    last_explanation: String,
    mismatch_start: Option<DateTime<Utc>>,
    fired: bool,
    // Bumped on every intent change and on stop.
    generation: u64,
}

impl TrackerState {
    fn reset_mismatch(&mut self) {
        self.mismatch_start = None;
        self.fired = false;
        self.last_explanation.clear();
        self.last_match = true;
    }
}

/// Tracks sustained divergence between declared intent and what is on
/// screen.
///
/// A check fires at most one [`MismatchEvent`] per mismatch episode; the
/// latch is released by a matching verdict, a new intent, or clearing.
#[derive(Debug)]
pub struct IntentMismatchTracker {
    settings: IntentSettings,
    state: Mutex<TrackerState>,
    running: AtomicBool,
}

impl IntentMismatchTracker {
    pub fn new(settings: IntentSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(TrackerState {
                last_match: true,
                ..TrackerState::default()
            }),
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &IntentSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare a new intent. Any running mismatch starts over.
    pub fn set_intent(&self, intent: &str) {
        let mut state = self.lock();
        state.intent = intent.trim().to_string();
        state.reset_mismatch();
        state.generation += 1;
        tracing::info!("Intent set");
    }

    /// Clear the intent, disabling checks until a new one is set.
    pub fn clear_intent(&self) {
        let mut state = self.lock();
        state.intent.clear();
        state.reset_mismatch();
        state.generation += 1;
        tracing::info!("Intent cleared");
    }

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Intent tracker started");
        }
    }

    /// Stop checking. Idempotent; a check in flight is discarded.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.lock().generation += 1;
            tracing::info!("Intent tracker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the next check if one is due.
    ///
    /// Returns `None` when stopped, when no intent is set, or when less
    /// than the check interval has passed since the last check. A claimed
    /// check advances the last-check time immediately, so concurrent
    /// drivers never judge the same interval twice.
    pub fn begin_check(&self, now: DateTime<Utc>) -> Option<PendingCheck> {
        if !self.is_running() {
            return None;
        }

        let mut state = self.lock();
        if state.intent.is_empty() {
            return None;
        }
        if let Some(last) = state.last_check {
            if now.signed_duration_since(last) < self.settings.check_interval {
                return None;
            }
        }

        state.last_check = Some(now);
        Some(PendingCheck {
            intent: state.intent.clone(),
            at: now,
            generation: state.generation,
        })
    }

    /// Apply the judge's result for a check claimed with
    /// [`begin_check`](Self::begin_check).
    ///
    /// A failed judgment counts as a match.
    pub fn complete_check(
        &self,
        pending: PendingCheck,
        verdict: Result<Verdict, JudgeError>,
    ) -> Option<MismatchEvent> {
        let verdict = verdict.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Intent judgment failed, assuming match");
            Verdict::matching(FAIL_OPEN_EXPLANATION)
        });

        let mut state = self.lock();
        if !self.is_running() || state.generation != pending.generation {
            tracing::debug!("Discarding stale intent check");
            return None;
        }

        let now = pending.at;
        state.last_match = verdict.matches;
        state.last_explanation = verdict.explanation;

        if verdict.matches {
            state.mismatch_start = None;
            state.fired = false;
            return None;
        }

        let start = *state.mismatch_start.get_or_insert(now);
        let duration = now.signed_duration_since(start);
        tracing::debug!(mismatch_secs = duration.num_seconds(), "Intent mismatch");

        if duration >= self.settings.mismatch_threshold && !state.fired {
            state.fired = true;
            tracing::info!(
                minutes = duration.num_minutes(),
                "Sustained intent mismatch detected"
            );
            return Some(MismatchEvent {
                intent: state.intent.clone(),
                explanation: state.last_explanation.clone(),
                at: now,
            });
        }

        None
    }

    /// Run one scheduled check end to end.
    ///
    /// Calling this more often than the check interval is a no-op. When the
    /// context source has nothing to offer the check is consumed without
    /// consulting the judge.
    pub fn check(
        &self,
        now: DateTime<Utc>,
        judge: &dyn IntentJudge,
        context: &dyn ContextSource,
    ) -> Option<MismatchEvent> {
        let pending = self.begin_check(now)?;

        let Some(image) = context.capture() else {
            tracing::debug!("No visual context available, skipping judgment");
            return None;
        };

        let verdict = judge.judge(&pending.intent, &image);
        // The capture is dropped here; it is never retained.
        drop(image);
        self.complete_check(pending, verdict)
    }

    /// Current state without triggering a check.
    pub fn get_state(&self, now: DateTime<Utc>) -> IntentState {
        let state = self.lock();
        if state.intent.is_empty() {
            return IntentState {
                last_match: true,
                ..IntentState::default()
            };
        }

        let mismatch_duration = state
            .mismatch_start
            .map(|start| {
                now.signed_duration_since(start)
                    .num_milliseconds()
                    .max(0) as f64
                    / 1000.0
            })
            .unwrap_or(0.0);

        IntentState {
            current_intent: state.intent.clone(),
            last_check_time: state.last_check,
            last_match: state.last_match,
            last_explanation: state.last_explanation.clone(),
            mismatch_duration,
            is_enabled: self.is_running(),
        }
    }
}
