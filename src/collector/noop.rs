//! Collector for platforms without an input tap.
//!
//! Lets the crate and binary build on non-Apple targets without pulling in
//! CoreGraphics/CoreFoundation. No system events are captured; events can
//! still be injected through [`NoopCollector::sender`].

use crate::collector::types::SensorEvent;
use crate::collector::CollectorConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// A collector that never observes system events.
pub struct NoopCollector {
    _config: CollectorConfig,
    sender: Sender<SensorEvent>,
    receiver: Receiver<SensorEvent>,
    running: Arc<AtomicBool>,
}

impl NoopCollector {
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(super::CHANNEL_CAPACITY);
        Self {
            _config: config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the collector as running.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        tracing::warn!("No input tap on this platform; keyboard and mouse are not observed");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for sensor events.
    pub fn receiver(&self) -> &Receiver<SensorEvent> {
        &self.receiver
    }

    /// Sender for injecting events from another source.
    pub fn sender(&self) -> Sender<SensorEvent> {
        self.sender.clone()
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<SensorEvent> {
        self.receiver.try_recv().ok()
    }
}

/// There is no Input Monitoring permission gate on these platforms.
pub fn check_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::KeyboardEvent;

    #[test]
    fn test_start_twice_fails() {
        let mut collector = NoopCollector::new(CollectorConfig::default());
        collector.start().unwrap();
        assert!(matches!(
            collector.start(),
            Err(CollectorError::AlreadyRunning)
        ));
        collector.stop();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_injected_events_are_received() {
        let collector = NoopCollector::new(CollectorConfig::default());
        collector
            .sender()
            .send(SensorEvent::Keyboard(KeyboardEvent::new(true)))
            .unwrap();
        assert!(matches!(
            collector.try_recv(),
            Some(SensorEvent::Keyboard(_))
        ));
    }
}
