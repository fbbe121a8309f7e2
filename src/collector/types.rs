//! Privacy-preserving event types for the Sati sensor agent.
//!
//! These types capture ONLY timing and, for pointer movement, the position
//! needed to integrate distance. Key codes, characters and click targets are
//! never represented.

use chrono::{DateTime, Utc};

/// A keyboard event capturing only timing information.
///
/// Privacy guarantee: No key codes, characters, or any content is captured.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardEvent {
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
    /// Whether this is a key press (true) or release (false)
    pub is_key_down: bool,
}

impl KeyboardEvent {
    pub fn new(is_key_down: bool) -> Self {
        Self::at(Utc::now(), is_key_down)
    }

    pub fn at(timestamp: DateTime<Utc>, is_key_down: bool) -> Self {
        Self {
            timestamp,
            is_key_down,
        }
    }
}

/// Mouse event type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventType {
    /// Pointer movement
    Move,
    /// Left button press
    LeftClick,
    /// Right button press
    RightClick,
}

/// A mouse event.
///
/// Privacy guarantee: positions live only inside the activity sensor's
/// short movement history and are never stored or exported.
#[derive(Debug, Clone, PartialEq)]
pub struct MouseEvent {
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
    /// Type of mouse event
    pub event_type: MouseEventType,
    /// Pointer position, only set for Move events
    pub position: Option<(f64, f64)>,
}

impl MouseEvent {
    /// Create a new pointer movement event.
    pub fn movement(x: f64, y: f64) -> Self {
        Self::movement_at(Utc::now(), x, y)
    }

    pub fn movement_at(timestamp: DateTime<Utc>, x: f64, y: f64) -> Self {
        Self {
            timestamp,
            event_type: MouseEventType::Move,
            position: Some((x, y)),
        }
    }

    /// Create a new click event.
    pub fn click(is_left: bool) -> Self {
        Self::click_at(Utc::now(), is_left)
    }

    pub fn click_at(timestamp: DateTime<Utc>, is_left: bool) -> Self {
        Self {
            timestamp,
            event_type: if is_left {
                MouseEventType::LeftClick
            } else {
                MouseEventType::RightClick
            },
            position: None,
        }
    }

    pub fn is_click(&self) -> bool {
        matches!(
            self.event_type,
            MouseEventType::LeftClick | MouseEventType::RightClick
        )
    }
}

/// Unified event type for the collector.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Keyboard(KeyboardEvent),
    Mouse(MouseEvent),
}

impl SensorEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SensorEvent::Keyboard(e) => e.timestamp,
            SensorEvent::Mouse(e) => e.timestamp,
        }
    }
}
