//! Weighted fusion of sensor scores into a discrete stress level.

use crate::core::arbiter::InterventionArbiter;
use crate::core::auxiliary::{AuxiliarySignal, DisabledSignal};
use crate::core::reading::Reading;
use crate::core::sensor::InputActivitySensor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Weight of the input activity score.
pub const INPUT_WEIGHT: f64 = 0.5;
/// Weight of the breathing concern score.
pub const BREATHING_WEIGHT: f64 = 0.3;
/// Weight of the posture concern score.
pub const POSTURE_WEIGHT: f64 = 0.2;

/// Lower bound (inclusive) of each level above calm.
pub const MODERATE_THRESHOLD: f64 = 30.0;
pub const HIGH_THRESHOLD: f64 = 60.0;
pub const CRITICAL_THRESHOLD: f64 = 85.0;

/// Discrete stress level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StressLevel {
    Calm,
    Moderate,
    High,
    Critical,
}

impl StressLevel {
    /// Step function over the composite score.
    pub fn from_score(score: f64) -> Self {
        if score >= CRITICAL_THRESHOLD {
            StressLevel::Critical
        } else if score >= HIGH_THRESHOLD {
            StressLevel::High
        } else if score >= MODERATE_THRESHOLD {
            StressLevel::Moderate
        } else {
            StressLevel::Calm
        }
    }

    /// HIGH and CRITICAL warrant an intervention.
    pub fn is_elevated(&self) -> bool {
        matches!(self, StressLevel::High | StressLevel::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressLevel::Calm => "CALM",
            StressLevel::Moderate => "MODERATE",
            StressLevel::High => "HIGH",
            StressLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for StressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite score from the three sub-scores.
///
/// A disabled signal contributes zero and the remaining weights are not
/// rescaled, so switching a sensor off can only lower the composite.
pub fn composite(input: Reading<f64>, breathing: Reading<f64>, posture: Reading<f64>) -> f64 {
    let score = input.score_or_zero() * INPUT_WEIGHT
        + breathing.score_or_zero() * BREATHING_WEIGHT
        + posture.score_or_zero() * POSTURE_WEIGHT;
    score.clamp(0.0, 100.0)
}

/// Result of one fusion query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionState {
    /// Composite score (0-100)
    pub score: f64,
    pub level: StressLevel,
    /// Contributing sub-scores
    pub input: Reading<f64>,
    pub breathing: Reading<f64>,
    pub posture: Reading<f64>,
    /// When the arbiter last fired an intervention
    pub last_intervention: Option<DateTime<Utc>>,
    /// Whether the cooldown has elapsed at the time of the query
    pub can_intervene: bool,
}

impl FusionState {
    /// Build a state from already-sampled sub-scores.
    pub fn from_scores(
        input: Reading<f64>,
        breathing: Reading<f64>,
        posture: Reading<f64>,
        last_intervention: Option<DateTime<Utc>>,
        can_intervene: bool,
    ) -> Self {
        let score = composite(input, breathing, posture);
        Self {
            score,
            level: StressLevel::from_score(score),
            input,
            breathing,
            posture,
            last_intervention,
            can_intervene,
        }
    }
}

/// One reading of each signal taken at the same tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScores {
    pub input: Reading<f64>,
    pub breathing: Reading<f64>,
    pub posture: Reading<f64>,
}

/// Combines the input sensor and auxiliary signals into a [`FusionState`].
///
/// The engine owns no timing state of its own: cooldown information is read
/// from the arbiter passed to [`fuse`](Self::fuse).
pub struct StressFusionEngine {
    input: Option<Arc<InputActivitySensor>>,
    breathing: Box<dyn AuxiliarySignal>,
    posture: Box<dyn AuxiliarySignal>,
}

impl StressFusionEngine {
    /// Engine over the given input sensor (or none) with breathing and
    /// posture disabled.
    pub fn new(input: Option<Arc<InputActivitySensor>>) -> Self {
        Self {
            input,
            breathing: Box::new(DisabledSignal::new("breathing")),
            posture: Box::new(DisabledSignal::new("posture")),
        }
    }

    pub fn with_breathing(mut self, signal: Box<dyn AuxiliarySignal>) -> Self {
        self.breathing = signal;
        self
    }

    pub fn with_posture(mut self, signal: Box<dyn AuxiliarySignal>) -> Self {
        self.posture = signal;
        self
    }

    pub fn input_sensor(&self) -> Option<&Arc<InputActivitySensor>> {
        self.input.as_ref()
    }

    /// Read every signal once.
    ///
    /// Auxiliary providers may block up to their timeout, so callers sample
    /// before taking any lock they share with other threads.
    pub fn sample(&self, now: DateTime<Utc>) -> SignalScores {
        let input = match &self.input {
            Some(sensor) => sensor.get_state(now).map(|snapshot| snapshot.stress_score),
            None => Reading::Disabled,
        };

        SignalScores {
            input,
            breathing: self.breathing.get_score(now),
            posture: self.posture.get_score(now),
        }
    }

    /// Fuse already sampled scores against the arbiter's cooldown.
    pub fn fuse(
        &self,
        scores: SignalScores,
        now: DateTime<Utc>,
        arbiter: &InterventionArbiter,
    ) -> FusionState {
        let state = FusionState::from_scores(
            scores.input,
            scores.breathing,
            scores.posture,
            arbiter.last_intervention(),
            arbiter.can_intervene(now),
        );
        tracing::debug!(score = state.score, level = %state.level, "Fused stress state");
        state
    }

    /// Sample every signal and fuse the result.
    pub fn get_state(&self, now: DateTime<Utc>, arbiter: &InterventionArbiter) -> FusionState {
        self.fuse(self.sample(now), now, arbiter)
    }
}
