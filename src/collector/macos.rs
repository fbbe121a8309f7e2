//! macOS implementation of event collection using a CGEvent tap.
//!
//! Captures keyboard and mouse events at the session level with a
//! listen-only tap. Requires Input Monitoring permission.

use crate::collector::types::{KeyboardEvent, MouseEvent, SensorEvent};
use crate::collector::CollectorConfig;
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, CallbackResult,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

thread_local! {
    // The tap callback is a plain fn, so the sender for the event-loop
    // thread lives here.
    static EVENT_SENDER: RefCell<Option<Sender<SensorEvent>>> = const { RefCell::new(None) };
}

/// The macOS event collector.
pub struct MacOSCollector {
    config: CollectorConfig,
    sender: Sender<SensorEvent>,
    receiver: Receiver<SensorEvent>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MacOSCollector {
    /// Create a new collector with the given configuration.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(super::CHANNEL_CAPACITY);

        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start capturing events in a background thread.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let config = self.config.clone();

        let handle = thread::spawn(move || {
            if let Err(e) = run_event_loop(sender, running.clone(), config) {
                tracing::error!(error = %e, "Event loop error");
            }
            running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing events.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for sensor events.
    pub fn receiver(&self) -> &Receiver<SensorEvent> {
        &self.receiver
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<SensorEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for MacOSCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    PermissionDenied,
    TapCreationFailed,
    RunLoopSourceFailed,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::PermissionDenied => {
                write!(f, "Input Monitoring permission not granted")
            }
            CollectorError::TapCreationFailed => write!(f, "Failed to create CGEvent tap"),
            CollectorError::RunLoopSourceFailed => {
                write!(f, "Failed to create run loop source")
            }
        }
    }
}

impl std::error::Error for CollectorError {}

fn build_event_types(config: &CollectorConfig) -> Vec<CGEventType> {
    let mut types = Vec::new();

    if config.capture_keyboard {
        types.push(CGEventType::KeyDown);
        types.push(CGEventType::KeyUp);
        types.push(CGEventType::FlagsChanged);
    }

    if config.capture_mouse {
        types.push(CGEventType::MouseMoved);
        types.push(CGEventType::LeftMouseDown);
        types.push(CGEventType::RightMouseDown);
        types.push(CGEventType::LeftMouseDragged);
        types.push(CGEventType::RightMouseDragged);
    }

    types
}

fn event_callback(
    _proxy: CGEventTapProxy,
    event_type: CGEventType,
    event: &CGEvent,
) -> CallbackResult {
    EVENT_SENDER.with(|sender_cell| {
        if let Some(ref sender) = *sender_cell.borrow() {
            if let Some(sensor_event) = process_cg_event(event_type, event) {
                // Never block the tap; drop the event if the channel is full
                let _ = sender.try_send(sensor_event);
            }
        }
    });

    // Passive observer: the event continues unchanged
    CallbackResult::Keep
}

fn run_event_loop(
    sender: Sender<SensorEvent>,
    running: Arc<AtomicBool>,
    config: CollectorConfig,
) -> Result<(), CollectorError> {
    let event_types = build_event_types(&config);

    EVENT_SENDER.with(|s| {
        *s.borrow_mut() = Some(sender);
    });

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        event_types,
        event_callback,
    )
    .map_err(|_| CollectorError::TapCreationFailed)?;

    let source = tap
        .mach_port()
        .create_runloop_source(0)
        .map_err(|_| CollectorError::RunLoopSourceFailed)?;

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }

    tap.enable();

    while running.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopCommonModes },
            std::time::Duration::from_millis(100),
            false,
        );
    }

    EVENT_SENDER.with(|s| {
        s.borrow_mut().take();
    });

    Ok(())
}

/// Convert a CGEvent into a SensorEvent.
///
/// Privacy: key codes and characters are never read. The pointer location
/// is passed on only for movement, where the activity sensor integrates it
/// into travelled distance.
fn process_cg_event(event_type: CGEventType, event: &CGEvent) -> Option<SensorEvent> {
    use core_graphics::event::CGEventType::*;

    match event_type {
        KeyDown => Some(SensorEvent::Keyboard(KeyboardEvent::new(true))),
        KeyUp => Some(SensorEvent::Keyboard(KeyboardEvent::new(false))),
        // Modifier presses count as keystrokes
        FlagsChanged => Some(SensorEvent::Keyboard(KeyboardEvent::new(true))),

        MouseMoved | LeftMouseDragged | RightMouseDragged => {
            let location = event.location();
            Some(SensorEvent::Mouse(MouseEvent::movement(location.x, location.y)))
        }

        LeftMouseDown => Some(SensorEvent::Mouse(MouseEvent::click(true))),
        RightMouseDown => Some(SensorEvent::Mouse(MouseEvent::click(false))),

        _ => None,
    }
}

/// Check if the application has Input Monitoring permission.
///
/// macOS has no direct query for this; creating a passive tap fails when
/// the permission is missing.
pub fn check_permission() -> bool {
    let result = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    );

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types_follow_config() {
        let keyboard_only = CollectorConfig {
            capture_keyboard: true,
            capture_mouse: false,
        };
        let types = build_event_types(&keyboard_only);
        assert_eq!(types.len(), 3);

        let none = CollectorConfig {
            capture_keyboard: false,
            capture_mouse: false,
        };
        assert!(build_event_types(&none).is_empty());
    }

    #[test]
    fn test_collector_creation() {
        let collector = MacOSCollector::new(CollectorConfig::default());
        assert!(!collector.is_running());
    }
}
