//! Intervention cooldown state machine.

use crate::core::fusion::{FusionState, StressLevel};
use crate::error::{positive_seconds, EngineError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Most recently observed level, collapsed to the two states that matter
/// for calm restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    CalmObserved,
    ElevatedObserved,
}

/// An intervention fired by the arbiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionEvent {
    pub level: StressLevel,
    pub score: f64,
    pub at: DateTime<Utc>,
}

/// Outcome of one [`InterventionArbiter::evaluate`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterEvent {
    Intervention(InterventionEvent),
    /// Stress dropped from HIGH or CRITICAL straight back to CALM.
    CalmRestored { at: DateTime<Utc> },
}

/// Decides when an elevated stress level turns into an intervention.
///
/// Takes `&mut self`: callers sharing an arbiter across threads put it
/// behind a mutex so evaluations serialize and two interventions are always
/// more than one cooldown apart.
#[derive(Debug, Clone)]
pub struct InterventionArbiter {
    cooldown: Duration,
    last_intervention: Option<DateTime<Utc>>,
    last_level: Option<StressLevel>,
}

impl InterventionArbiter {
    pub fn new(cooldown_secs: f64) -> Result<Self, EngineError> {
        let cooldown =
            positive_seconds(cooldown_secs, "intervention cooldown", EngineError::InvalidCooldown)?;
        Ok(Self {
            cooldown,
            last_intervention: None,
            last_level: None,
        })
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_intervention(&self) -> Option<DateTime<Utc>> {
        self.last_intervention
    }

    pub fn last_level(&self) -> Option<StressLevel> {
        self.last_level
    }

    pub fn observation(&self) -> Observation {
        match self.last_level {
            Some(level) if level.is_elevated() => Observation::ElevatedObserved,
            _ => Observation::CalmObserved,
        }
    }

    /// True once strictly more than the cooldown has passed since the last
    /// intervention, or if none has fired yet.
    pub fn can_intervene(&self, now: DateTime<Utc>) -> bool {
        match self.last_intervention {
            Some(at) => now.signed_duration_since(at) > self.cooldown,
            None => true,
        }
    }

    /// Advance the state machine with the state computed for this tick.
    ///
    /// The cooldown is checked against `now` here rather than trusting
    /// `state.can_intervene`, which may have been computed before another
    /// evaluation fired.
    pub fn evaluate(&mut self, state: &FusionState, now: DateTime<Utc>) -> Option<ArbiterEvent> {
        let previous = self.last_level.replace(state.level);

        if state.level == StressLevel::Calm && previous.is_some_and(|level| level.is_elevated()) {
            tracing::info!("Calm restored");
            return Some(ArbiterEvent::CalmRestored { at: now });
        }

        if state.level.is_elevated() {
            if !self.can_intervene(now) {
                tracing::debug!(level = %state.level, "Intervention suppressed by cooldown");
                return None;
            }

            self.last_intervention = Some(now);
            tracing::info!(level = %state.level, score = state.score, "Intervention triggered");
            return Some(ArbiterEvent::Intervention(InterventionEvent {
                level: state.level,
                score: state.score,
                at: now,
            }));
        }

        None
    }

    /// Forget all history, as if freshly constructed.
    pub fn reset(&mut self) {
        self.last_intervention = None;
        self.last_level = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reading::Reading;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn state_at(score: f64) -> FusionState {
        // Input alone is weighted 0.5, so drive all three signals equally.
        FusionState::from_scores(
            Reading::Enabled(score),
            Reading::Enabled(score),
            Reading::Enabled(score),
            None,
            true,
        )
    }

    #[test]
    fn test_rejects_non_positive_cooldown() {
        assert!(matches!(
            InterventionArbiter::new(0.0),
            Err(EngineError::InvalidCooldown(_))
        ));
        assert!(InterventionArbiter::new(-1.0).is_err());
    }

    #[test]
    fn test_fresh_arbiter_can_intervene() {
        let arbiter = InterventionArbiter::new(120.0).unwrap();
        assert!(arbiter.can_intervene(t0()));
        assert_eq!(arbiter.observation(), Observation::CalmObserved);
    }

    #[test]
    fn test_cooldown_suppresses_second_intervention() {
        let mut arbiter = InterventionArbiter::new(120.0).unwrap();
        let critical = state_at(95.0);

        let first = arbiter.evaluate(&critical, t0());
        assert!(matches!(first, Some(ArbiterEvent::Intervention(_))));

        assert_eq!(arbiter.evaluate(&critical, t0() + Duration::seconds(60)), None);
        // Exactly at the cooldown is still inside it.
        assert_eq!(arbiter.evaluate(&critical, t0() + Duration::seconds(120)), None);

        let later = arbiter.evaluate(&critical, t0() + Duration::seconds(121));
        match later {
            Some(ArbiterEvent::Intervention(event)) => {
                assert_eq!(event.level, StressLevel::Critical);
                assert_eq!(event.at, t0() + Duration::seconds(121));
            }
            other => panic!("expected intervention, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_can_intervene_flag_is_ignored() {
        let mut arbiter = InterventionArbiter::new(120.0).unwrap();
        let critical = state_at(95.0);
        assert!(arbiter.evaluate(&critical, t0()).is_some());

        // `critical` still claims can_intervene = true.
        assert!(critical.can_intervene);
        assert_eq!(arbiter.evaluate(&critical, t0() + Duration::seconds(1)), None);
    }

    #[test]
    fn test_calm_restored_once_after_high() {
        let mut arbiter = InterventionArbiter::new(120.0).unwrap();
        let calm = state_at(10.0);
        let high = state_at(70.0);

        assert_eq!(arbiter.evaluate(&calm, t0()), None);
        assert_eq!(arbiter.evaluate(&calm, t0() + Duration::seconds(2)), None);
        assert!(matches!(
            arbiter.evaluate(&high, t0() + Duration::seconds(4)),
            Some(ArbiterEvent::Intervention(_))
        ));
        assert_eq!(arbiter.observation(), Observation::ElevatedObserved);
        assert_eq!(
            arbiter.evaluate(&calm, t0() + Duration::seconds(6)),
            Some(ArbiterEvent::CalmRestored {
                at: t0() + Duration::seconds(6)
            })
        );
        assert_eq!(arbiter.evaluate(&calm, t0() + Duration::seconds(8)), None);
    }

    #[test]
    fn test_moderate_does_not_intervene_or_restore() {
        let mut arbiter = InterventionArbiter::new(120.0).unwrap();
        assert!(arbiter.evaluate(&state_at(70.0), t0()).is_some());
        assert_eq!(arbiter.evaluate(&state_at(45.0), t0() + Duration::seconds(2)), None);
        // MODERATE -> CALM is not a restoration from elevated stress.
        assert_eq!(arbiter.evaluate(&state_at(5.0), t0() + Duration::seconds(4)), None);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut arbiter = InterventionArbiter::new(120.0).unwrap();
        arbiter.evaluate(&state_at(95.0), t0());
        arbiter.reset();
        assert!(arbiter.can_intervene(t0()));
        assert_eq!(arbiter.last_level(), None);
    }
}
