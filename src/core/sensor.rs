//! Input activity sensing.
//!
//! Turns raw keyboard and mouse timing into rates over a sliding window,
//! learns a baseline typing speed during an initial calibration period, and
//! maps the recent keystroke count onto a 0-100 stress score.
//! All features are computed from timing and movement distance only.

use crate::collector::types::{MouseEventType, SensorEvent};
use crate::config::DetectionConfig;
use crate::core::reading::Reading;
use crate::core::windowing::{
    window_secs, PositionTrail, WindowedCounter, CLICK_HISTORY, KEYSTROKE_HISTORY,
    POSITION_HISTORY,
};
use crate::error::{positive_seconds, EngineError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Validated settings for an [`InputActivitySensor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySettings {
    window: Duration,
    baseline_duration: Duration,
    stress_threshold: u32,
}

impl ActivitySettings {
    pub fn new(
        window_secs: f64,
        baseline_secs: f64,
        stress_threshold: u32,
    ) -> Result<Self, EngineError> {
        let window = positive_seconds(window_secs, "activity window", EngineError::InvalidWindow)?;
        let baseline_duration =
            positive_seconds(baseline_secs, "baseline duration", EngineError::InvalidWindow)?;
        if stress_threshold == 0 {
            return Err(EngineError::InvalidThreshold(
                "stress threshold must be at least one event per window".to_string(),
            ));
        }

        Ok(Self {
            window,
            baseline_duration,
            stress_threshold,
        })
    }

    pub fn from_config(config: &DetectionConfig) -> Result<Self, EngineError> {
        Self::new(
            config.window_duration.as_secs_f64(),
            config.baseline_duration.as_secs_f64(),
            config.stress_threshold,
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn baseline_duration(&self) -> Duration {
        self.baseline_duration
    }

    pub fn stress_threshold(&self) -> u32 {
        self.stress_threshold
    }
}

/// Point-in-time view of input activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Key presses per second over the window
    pub keystrokes_per_second: f64,
    /// Mouse button presses per second over the window
    pub clicks_per_second: f64,
    /// Pointer travel per second over the window
    pub mouse_distance_per_second: f64,
    /// Recent keystroke count relative to the threshold (0-100)
    pub stress_score: f64,
    /// Mean typing speed observed during calibration
    pub baseline_typing_speed: f64,
    /// Whether the sensor is still inside its calibration period
    pub is_calibrating: bool,
}

/// Keyboard and mouse activity sensor.
///
/// Event producers (input listeners) and the monitoring loop share one
/// instance; every piece of mutable state sits behind its own lock.
#[derive(Debug)]
pub struct InputActivitySensor {
    settings: ActivitySettings,
    keystrokes: WindowedCounter,
    clicks: WindowedCounter,
    positions: PositionTrail,
    baseline_samples: Mutex<Vec<f64>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    running: AtomicBool,
    available: bool,
}

impl InputActivitySensor {
    /// Create a sensor. It records nothing until [`start`](Self::start).
    pub fn new(settings: ActivitySettings) -> Self {
        Self::build(settings, true)
    }

    /// Create a sensor for when input cannot be observed (no platform
    /// listener, or permission denied). It never runs and always reports
    /// [`Reading::Disabled`].
    pub fn unavailable(settings: ActivitySettings) -> Self {
        Self::build(settings, false)
    }

    fn build(settings: ActivitySettings, available: bool) -> Self {
        Self {
            settings,
            keystrokes: WindowedCounter::new(KEYSTROKE_HISTORY),
            clicks: WindowedCounter::new(CLICK_HISTORY),
            positions: PositionTrail::new(POSITION_HISTORY),
            baseline_samples: Mutex::new(Vec::new()),
            started_at: Mutex::new(None),
            running: AtomicBool::new(false),
            available,
        }
    }

    /// Start sensing; calibration begins at `now`.
    ///
    /// Returns false when the sensor is unavailable. Starting a running
    /// sensor is a no-op.
    pub fn start(&self, now: DateTime<Utc>) -> bool {
        if !self.available {
            tracing::warn!("Input activity sensor unavailable, not starting");
            return false;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return true;
        }

        *self
            .started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(now);
        tracing::info!("Input activity sensor started (timing only, no content)");
        true
    }

    /// Stop sensing. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Input activity sensor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn settings(&self) -> &ActivitySettings {
        &self.settings
    }

    /// Record a key press.
    pub fn on_key_event(&self, timestamp: DateTime<Utc>) {
        if self.is_running() {
            self.keystrokes.record(timestamp);
        }
    }

    /// Record a mouse button press.
    pub fn on_mouse_click(&self, timestamp: DateTime<Utc>) {
        if self.is_running() {
            self.clicks.record(timestamp);
        }
    }

    /// Record a pointer position.
    pub fn on_mouse_move(&self, timestamp: DateTime<Utc>, x: f64, y: f64) {
        if self.is_running() {
            self.positions.record(timestamp, x, y);
        }
    }

    /// Route a collector event to the matching recorder.
    ///
    /// Key releases are ignored; only presses count as keystrokes.
    pub fn record(&self, event: &SensorEvent) {
        match event {
            SensorEvent::Keyboard(e) if e.is_key_down => self.on_key_event(e.timestamp),
            SensorEvent::Keyboard(_) => {}
            SensorEvent::Mouse(e) => match (e.event_type, e.position) {
                (MouseEventType::Move, Some((x, y))) => self.on_mouse_move(e.timestamp, x, y),
                (MouseEventType::Move, None) => {}
                (MouseEventType::LeftClick | MouseEventType::RightClick, _) => {
                    self.on_mouse_click(e.timestamp)
                }
            },
        }
    }

    /// Compute the current activity snapshot.
    ///
    /// While calibrating, every query with recent typing adds the current
    /// typing rate to the baseline samples. Samples are only collected during
    /// the calibration period, so their number is bounded by how often the
    /// sensor is polled during that period.
    pub fn get_state(&self, now: DateTime<Utc>) -> Reading<SensorSnapshot> {
        if !self.is_running() {
            return Reading::Disabled;
        }

        let window = self.settings.window;
        // One read of the counter, so the score and the rate agree
        let recent_keystrokes = self.keystrokes.count_in_window(now, window);
        let keystrokes_per_second = recent_keystrokes as f64 / window_secs(window);
        let clicks_per_second = self.clicks.rate_in_window(now, window);
        let mouse_distance_per_second = self.positions.speed_in_window(now, window);

        let is_calibrating = self.is_calibrating(now);

        let baseline_typing_speed = {
            let mut samples = self
                .baseline_samples
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if is_calibrating && recent_keystrokes > 0 {
                samples.push(keystrokes_per_second);
            }
            if samples.is_empty() {
                0.0
            } else {
                samples.iter().mean()
            }
        };

        let stress_score = (100.0 * recent_keystrokes as f64
            / self.settings.stress_threshold as f64)
            .clamp(0.0, 100.0);

        Reading::Enabled(SensorSnapshot {
            keystrokes_per_second,
            clicks_per_second,
            mouse_distance_per_second,
            stress_score,
            baseline_typing_speed,
            is_calibrating,
        })
    }

    /// Report the stress score once it saturates, never during calibration.
    pub fn check_stress(&self, now: DateTime<Utc>) -> Option<f64> {
        let snapshot = match self.get_state(now) {
            Reading::Enabled(snapshot) => snapshot,
            Reading::Disabled => return None,
        };

        if snapshot.is_calibrating {
            return None;
        }

        if snapshot.stress_score >= 100.0 {
            tracing::debug!(score = snapshot.stress_score, "Input stress threshold reached");
            return Some(snapshot.stress_score);
        }

        None
    }

    /// Whether `now` still falls inside the calibration period.
    pub fn is_calibrating(&self, now: DateTime<Utc>) -> bool {
        let started_at = *self
            .started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match started_at {
            Some(start) => now.signed_duration_since(start) < self.settings.baseline_duration,
            None => true,
        }
    }

    /// Number of baseline samples collected so far.
    pub fn baseline_sample_count(&self) -> usize {
        self.baseline_samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{KeyboardEvent, MouseEvent};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    fn sensor() -> InputActivitySensor {
        let sensor = InputActivitySensor::new(ActivitySettings::new(10.0, 300.0, 50).unwrap());
        assert!(sensor.start(t0()));
        sensor
    }

    #[test]
    fn test_settings_reject_zero_window() {
        assert!(matches!(
            ActivitySettings::new(0.0, 300.0, 50),
            Err(EngineError::InvalidWindow(_))
        ));
        assert!(matches!(
            ActivitySettings::new(10.0, 300.0, 0),
            Err(EngineError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_initial_state_is_quiet() {
        let sensor = sensor();
        let snapshot = sensor.get_state(t0()).as_enabled().cloned().unwrap();
        assert_eq!(snapshot.keystrokes_per_second, 0.0);
        assert_eq!(snapshot.stress_score, 0.0);
        assert!(snapshot.is_calibrating);
        assert_eq!(sensor.baseline_sample_count(), 0);
    }

    #[test]
    fn test_rates_and_score() {
        let sensor = sensor();
        for i in 0..25 {
            sensor.on_key_event(t0() + ms(i * 100));
        }
        for i in 0..5 {
            sensor.on_mouse_click(t0() + ms(i * 200));
        }
        sensor.on_mouse_move(t0(), 0.0, 0.0);
        sensor.on_mouse_move(t0() + ms(500), 30.0, 40.0);

        let snapshot = sensor.get_state(t0() + ms(5000)).as_enabled().cloned().unwrap();
        assert!((snapshot.keystrokes_per_second - 2.5).abs() < 1e-9);
        assert!((snapshot.clicks_per_second - 0.5).abs() < 1e-9);
        assert!((snapshot.mouse_distance_per_second - 5.0).abs() < 1e-9);
        // 25 keystrokes against a threshold of 50 per window
        assert!((snapshot.stress_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_and_score_come_from_one_count() {
        let sensor = sensor();
        for n in 1..=20 {
            sensor.on_key_event(t0() + ms(n * 100));
            let snapshot = sensor
                .get_state(t0() + ms(n * 100))
                .as_enabled()
                .cloned()
                .unwrap();
            // 10 s window, threshold 50: score = 100 * count / 50, rate = count / 10
            assert!((snapshot.stress_score - snapshot.keystrokes_per_second * 20.0).abs() < 1e-9);
            assert!((snapshot.keystrokes_per_second - n as f64 / 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_score_saturates_at_100() {
        let sensor = sensor();
        for i in 0..120 {
            sensor.on_key_event(t0() + ms(i * 50));
        }
        let snapshot = sensor.get_state(t0() + ms(6000)).as_enabled().cloned().unwrap();
        assert_eq!(snapshot.stress_score, 100.0);
    }

    #[test]
    fn test_baseline_collected_only_while_calibrating() {
        let sensor = sensor();

        sensor.on_key_event(t0() + ms(1000));
        sensor.on_key_event(t0() + ms(1500));
        let snapshot = sensor.get_state(t0() + ms(2000)).as_enabled().cloned().unwrap();
        assert!((snapshot.baseline_typing_speed - 0.2).abs() < 1e-9);
        assert_eq!(sensor.baseline_sample_count(), 1);

        // A query without recent typing adds nothing.
        sensor.get_state(t0() + ms(60_000));
        assert_eq!(sensor.baseline_sample_count(), 1);

        // After calibration, typing no longer feeds the baseline.
        let late = t0() + Duration::seconds(400);
        for i in 0..10 {
            sensor.on_key_event(late + ms(i * 100));
        }
        let snapshot = sensor.get_state(late + ms(1000)).as_enabled().cloned().unwrap();
        assert!(!snapshot.is_calibrating);
        assert_eq!(sensor.baseline_sample_count(), 1);
        assert!((snapshot.baseline_typing_speed - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_check_stress_suppressed_during_calibration() {
        let sensor = sensor();
        for i in 0..100 {
            sensor.on_key_event(t0() + ms(i * 50));
        }
        assert_eq!(sensor.check_stress(t0() + ms(5000)), None);

        let late = t0() + Duration::seconds(301);
        for i in 0..100 {
            sensor.on_key_event(late + ms(i * 50));
        }
        assert_eq!(sensor.check_stress(late + ms(5000)), Some(100.0));
    }

    #[test]
    fn test_unavailable_sensor_is_disabled() {
        let sensor =
            InputActivitySensor::unavailable(ActivitySettings::new(10.0, 300.0, 50).unwrap());
        assert!(!sensor.start(t0()));
        sensor.on_key_event(t0());
        assert_eq!(sensor.get_state(t0()), Reading::Disabled);
        assert_eq!(sensor.check_stress(t0()), None);
    }

    #[test]
    fn test_stop_is_idempotent_and_disables() {
        let sensor = sensor();
        sensor.stop();
        sensor.stop();
        assert!(!sensor.is_running());
        assert_eq!(sensor.get_state(t0()), Reading::Disabled);
    }

    #[test]
    fn test_record_routes_collector_events() {
        let sensor = sensor();
        sensor.record(&SensorEvent::Keyboard(KeyboardEvent::at(t0(), true)));
        sensor.record(&SensorEvent::Keyboard(KeyboardEvent::at(t0(), false)));
        sensor.record(&SensorEvent::Mouse(MouseEvent::click_at(t0(), true)));
        sensor.record(&SensorEvent::Mouse(MouseEvent::movement_at(t0(), 0.0, 0.0)));
        sensor.record(&SensorEvent::Mouse(MouseEvent::movement_at(t0() + ms(10), 0.0, 10.0)));

        let snapshot = sensor.get_state(t0() + ms(100)).as_enabled().cloned().unwrap();
        assert!((snapshot.keystrokes_per_second - 0.1).abs() < 1e-9);
        assert!((snapshot.clicks_per_second - 0.1).abs() < 1e-9);
        assert!((snapshot.mouse_distance_per_second - 1.0).abs() < 1e-9);
    }
}
