//! Core engine of the Sati sensor agent.
//!
//! This module contains:
//! - Sliding-window event histories
//! - The input activity sensor and auxiliary concern signals
//! - Weighted stress fusion and the intervention arbiter
//! - The intent mismatch tracker
//! - Session report building

pub mod arbiter;
pub mod auxiliary;
pub mod fusion;
pub mod intent;
pub mod reading;
pub mod report;
pub mod sensor;
pub mod windowing;

pub use arbiter::{ArbiterEvent, InterventionArbiter, InterventionEvent, Observation};
pub use auxiliary::{
    breathing_concern, posture_concern, AuxiliarySignal, CachedSignal, DisabledSignal,
    SignalProvider,
};
pub use fusion::{composite, FusionState, SignalScores, StressFusionEngine, StressLevel};
pub use intent::{
    ContextSource, IntentJudge, IntentMismatchTracker, IntentSettings, IntentState,
    MismatchEvent, PendingCheck, Verdict,
};
pub use reading::Reading;
pub use report::{ReportBuilder, SessionReport, PRODUCER_NAME, REPORT_VERSION};
pub use sensor::{ActivitySettings, InputActivitySensor, SensorSnapshot};
pub use windowing::{PositionTrail, WindowedCounter};
