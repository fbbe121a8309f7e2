//! Tagged availability for sensor outputs.

use serde::{Deserialize, Serialize};

/// A sensor output that is either unavailable or carries a value.
///
/// Disabled sensors are represented explicitly rather than as a zero score,
/// so every consumer has to decide what absence means for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reading<T> {
    Disabled,
    Enabled(T),
}

impl<T> Reading<T> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Reading::Enabled(_))
    }

    pub fn as_enabled(&self) -> Option<&T> {
        match self {
            Reading::Enabled(value) => Some(value),
            Reading::Disabled => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Reading<U> {
        match self {
            Reading::Enabled(value) => Reading::Enabled(f(value)),
            Reading::Disabled => Reading::Disabled,
        }
    }
}

impl Reading<f64> {
    /// Score contribution for fusion: a disabled signal contributes nothing.
    pub fn score_or_zero(&self) -> f64 {
        match self {
            Reading::Enabled(score) => *score,
            Reading::Disabled => 0.0,
        }
    }
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Reading::Disabled
    }
}
