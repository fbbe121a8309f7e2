//! Event collection for the Sati sensor agent.
//!
//! Platform listeners turn system input into privacy-preserving
//! [`SensorEvent`]s on a bounded channel; [`route_event`] feeds them to the
//! activity sensor.

pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

use crate::config::SourceConfig;
use crate::core::sensor::InputActivitySensor;
use crate::transparency::TransparencyLog;

pub use types::{KeyboardEvent, MouseEvent, MouseEventType, SensorEvent};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, CollectorError, MacOSCollector};

/// Platform-agnostic collector type alias
#[cfg(target_os = "macos")]
pub type Collector = MacOSCollector;

#[cfg(not(target_os = "macos"))]
pub use noop::{check_permission, CollectorError, NoopCollector};

/// Platform-agnostic collector type alias
#[cfg(not(target_os = "macos"))]
pub type Collector = NoopCollector;

/// Whether this build has a real system input listener.
pub const HAS_INPUT_TAP: bool = cfg!(target_os = "macos");

/// Bound on queued events between the listener and the consumer.
pub const CHANNEL_CAPACITY: usize = 10_000;

/// Configuration for which event sources to capture.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub capture_keyboard: bool,
    pub capture_mouse: bool,
}

impl CollectorConfig {
    pub fn from_sources(sources: &SourceConfig) -> Self {
        Self {
            capture_keyboard: sources.keyboard,
            capture_mouse: sources.mouse,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_mouse: true,
        }
    }
}

/// Count an event in the transparency log and hand it to the sensor.
pub fn route_event(event: &SensorEvent, sensor: &InputActivitySensor, log: &TransparencyLog) {
    match event {
        SensorEvent::Keyboard(_) => log.record_keyboard_event(),
        SensorEvent::Mouse(_) => log.record_mouse_event(),
    }
    sensor.record(event);
}
