//! Session report builder.
//!
//! A report summarizes one monitoring session: when it ran, which
//! interventions fired, when stress returned to calm, and how often each
//! declared intent was abandoned. Judge explanations are never included.

use crate::core::arbiter::InterventionEvent;
use crate::core::fusion::{FusionState, StressLevel};
use crate::core::intent::MismatchEvent;
use crate::transparency::TransparencyStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The current report format version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "sati-sensor-agent";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
}

/// Privacy declaration attached to every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPrivacy {
    /// Always false: no key content, coordinates or screenshots
    pub contains_pii: bool,
    /// Whether judge explanations are included (always false)
    pub explanations_included: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for ReportPrivacy {
    fn default() -> Self {
        Self {
            contains_pii: false,
            explanations_included: false,
            notes: Some(
                "Timing, scores and counts only - no key content, coordinates or screen content"
                    .to_string(),
            ),
        }
    }
}

/// Mismatch count for one declared intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSummary {
    pub intent: String,
    pub mismatches: u64,
}

/// Summary of one monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report schema version
    pub report_version: String,
    pub producer: ReportProducer,
    /// Human-readable machine label
    pub device_label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    /// Highest level observed during the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_level: Option<StressLevel>,
    pub peak_score: f64,
    pub interventions: Vec<InterventionEvent>,
    pub calm_restorations: Vec<DateTime<Utc>>,
    pub intents: Vec<IntentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TransparencyStats>,
    pub privacy: ReportPrivacy,
}

impl SessionReport {
    pub fn total_mismatches(&self) -> u64 {
        self.intents.iter().map(|i| i.mismatches).sum()
    }
}

/// Accumulates session events and builds the final [`SessionReport`].
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    instance_id: Uuid,
    device_label: String,
    started_at: DateTime<Utc>,
    peak: Option<(StressLevel, f64)>,
    interventions: Vec<InterventionEvent>,
    calm_restorations: Vec<DateTime<Utc>>,
    mismatches: BTreeMap<String, u64>,
}

impl ReportBuilder {
    /// Start a report with a fresh instance id and the local hostname as
    /// device label.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::with_device_label(started_at, hostname)
    }

    pub fn with_device_label(started_at: DateTime<Utc>, device_label: impl Into<String>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            device_label: device_label.into(),
            started_at,
            peak: None,
            interventions: Vec::new(),
            calm_restorations: Vec::new(),
            mismatches: BTreeMap::new(),
        }
    }

    /// Get the instance ID.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Track the peak composite score.
    pub fn record_state(&mut self, state: &FusionState) {
        let higher = match self.peak {
            Some((_, score)) => state.score > score,
            None => true,
        };
        if higher {
            self.peak = Some((state.level, state.score));
        }
    }

    pub fn record_intervention(&mut self, event: &InterventionEvent) {
        self.interventions.push(event.clone());
    }

    pub fn record_calm_restored(&mut self, at: DateTime<Utc>) {
        self.calm_restorations.push(at);
    }

    /// Count a mismatch against its intent. The explanation is dropped.
    pub fn record_mismatch(&mut self, event: &MismatchEvent) {
        *self.mismatches.entry(event.intent.clone()).or_insert(0) += 1;
    }

    pub fn intervention_count(&self) -> usize {
        self.interventions.len()
    }

    /// Build the report for a session ending at `ended_at`.
    pub fn build(&self, ended_at: DateTime<Utc>, stats: Option<TransparencyStats>) -> SessionReport {
        SessionReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: self.instance_id.to_string(),
            },
            device_label: self.device_label.clone(),
            started_at: self.started_at,
            ended_at,
            duration_secs: ended_at
                .signed_duration_since(self.started_at)
                .num_seconds()
                .max(0),
            peak_level: self.peak.map(|(level, _)| level),
            peak_score: self.peak.map(|(_, score)| score).unwrap_or(0.0),
            interventions: self.interventions.clone(),
            calm_restorations: self.calm_restorations.clone(),
            intents: self
                .mismatches
                .iter()
                .map(|(intent, &mismatches)| IntentSummary {
                    intent: intent.clone(),
                    mismatches,
                })
                .collect(),
            stats,
            privacy: ReportPrivacy::default(),
        }
    }

    /// Build and serialize the report to JSON.
    pub fn build_json(&self, ended_at: DateTime<Utc>, stats: Option<TransparencyStats>) -> String {
        let report = self.build(ended_at, stats);
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
    }
}
