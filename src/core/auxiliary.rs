//! Auxiliary concern signals (breathing, posture, screen).
//!
//! Each modality is produced by an external provider that knows how to turn
//! its raw capture into a 0-100 concern score. The engine only sees the
//! score, sampled no faster than the provider's refresh interval and cached
//! in between.

use crate::core::reading::Reading;
use crate::error::{positive_seconds, EngineError, SignalError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Forward neck angle (degrees) at which the posture estimate saturates.
pub const MAX_NECK_ANGLE: f64 = 30.0;

/// Below this confidence a breathing-rate estimate is ignored.
const MIN_BREATHING_CONFIDENCE: f64 = 0.5;

/// Source of raw concern scores for one modality.
pub trait SignalProvider: Send {
    /// Acquire one sample. May block for the duration of a capture.
    fn sample(&mut self) -> Result<f64, SignalError>;
}

impl<F> SignalProvider for F
where
    F: FnMut() -> Result<f64, SignalError> + Send,
{
    fn sample(&mut self) -> Result<f64, SignalError> {
        self()
    }
}

/// A 0-100 concern score the fusion engine can consume.
pub trait AuxiliarySignal: Send + Sync {
    /// Short modality name used in logs.
    fn name(&self) -> &str;

    /// Current concern score, or `Disabled` when the modality is off.
    fn get_score(&self, now: DateTime<Utc>) -> Reading<f64>;
}

/// A modality that is switched off or has no provider.
#[derive(Debug, Clone)]
pub struct DisabledSignal {
    name: String,
}

impl DisabledSignal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AuxiliarySignal for DisabledSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_score(&self, _now: DateTime<Utc>) -> Reading<f64> {
        Reading::Disabled
    }
}

struct CacheState<P> {
    provider: P,
    last_sample_at: Option<DateTime<Utc>>,
    last: Reading<f64>,
    unavailable: bool,
}

/// Wraps a provider with a minimum refresh interval and a last-value cache.
///
/// - Within the refresh interval the cached reading is returned unchanged.
/// - A transient acquisition failure keeps the previous reading (so an
///   enabled signal stays enabled, a never-sampled one stays disabled).
/// - [`SignalError::Unavailable`] disables the signal for good.
pub struct CachedSignal<P> {
    name: String,
    refresh_interval: Duration,
    state: Mutex<CacheState<P>>,
}

impl<P: SignalProvider> CachedSignal<P> {
    pub fn new(
        name: impl Into<String>,
        provider: P,
        refresh_secs: f64,
    ) -> Result<Self, EngineError> {
        let refresh_interval =
            positive_seconds(refresh_secs, "refresh interval", EngineError::InvalidInterval)?;

        Ok(Self {
            name: name.into(),
            refresh_interval,
            state: Mutex::new(CacheState {
                provider,
                last_sample_at: None,
                last: Reading::Disabled,
                unavailable: false,
            }),
        })
    }
}

impl<P: SignalProvider> AuxiliarySignal for CachedSignal<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_score(&self, now: DateTime<Utc>) -> Reading<f64> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if state.unavailable {
            return Reading::Disabled;
        }

        if let Some(at) = state.last_sample_at {
            if now.signed_duration_since(at) < self.refresh_interval {
                return state.last;
            }
        }

        state.last_sample_at = Some(now);
        match state.provider.sample() {
            Ok(score) if score.is_finite() => {
                state.last = Reading::Enabled(score.clamp(0.0, 100.0));
            }
            Ok(score) => {
                tracing::warn!(signal = %self.name, score, "Discarding non-finite score");
            }
            Err(SignalError::Unavailable(reason)) => {
                tracing::warn!(signal = %self.name, %reason, "Signal disabled");
                state.unavailable = true;
                state.last = Reading::Disabled;
            }
            Err(SignalError::Acquisition(reason)) => {
                tracing::debug!(signal = %self.name, %reason, "Sample failed, keeping cached value");
            }
        }

        state.last
    }
}

/// Breathing concern from an estimated respiratory rate.
///
/// Fast breathing scales up to 100 over ten breaths per minute above the
/// upper limit; unusually slow breathing is a moderate concern.
pub fn breathing_concern(breaths_per_minute: f64, confidence: f64, min_rate: u32, max_rate: u32) -> f64 {
    if confidence < MIN_BREATHING_CONFIDENCE {
        return 0.0;
    }

    let (min_rate, max_rate) = (min_rate as f64, max_rate as f64);
    if breaths_per_minute > max_rate {
        ((breaths_per_minute - max_rate) / 10.0 * 100.0).min(100.0)
    } else if breaths_per_minute < min_rate {
        50.0
    } else {
        0.0
    }
}

/// Posture concern from an estimated forward neck angle in degrees.
pub fn posture_concern(neck_angle: f64, threshold: u32) -> f64 {
    let threshold = threshold as f64;
    if neck_angle <= threshold {
        return 0.0;
    }
    if threshold >= MAX_NECK_ANGLE {
        return 100.0;
    }
    ((neck_angle - threshold) / (MAX_NECK_ANGLE - threshold) * 100.0).clamp(0.0, 100.0)
}
