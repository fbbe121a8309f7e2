//! Error types for the Sati sensor agent engine.

use thiserror::Error;

/// Errors raised when an engine component is constructed with settings it
/// cannot honor. These are fatal to the component being built, never to the
/// whole agent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid window length: {0}")]
    InvalidWindow(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid cooldown: {0}")]
    InvalidCooldown(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

/// Errors reported by an auxiliary score provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// The modality cannot work on this machine (missing hardware,
    /// permission, or provider). Permanent for the provider's lifetime.
    #[error("Signal unavailable: {0}")]
    Unavailable(String),

    /// A single acquisition failed; the next one may succeed.
    #[error("Signal acquisition failed: {0}")]
    Acquisition(String),
}

/// Errors reported by an intent-match judge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JudgeError {
    #[error("Judge unavailable: {0}")]
    Unavailable(String),

    #[error("Judge request failed: {0}")]
    Request(String),
}

/// Convert a non-negative number of seconds into a chrono duration,
/// rejecting zero, negative, and non-finite values.
pub(crate) fn positive_seconds(
    secs: f64,
    what: &str,
    make: fn(String) -> EngineError,
) -> Result<chrono::Duration, EngineError> {
    let micros = (secs * 1_000_000.0).round();
    if !secs.is_finite() || micros < 1.0 {
        return Err(make(format!("{what} must be positive, got {secs}")));
    }
    Ok(chrono::Duration::microseconds(micros as i64))
}
