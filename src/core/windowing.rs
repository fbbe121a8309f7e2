//! Bounded event histories with sliding-window queries.
//!
//! Input listeners append timestamps at whatever rate the user produces
//! them; the monitoring loop asks how many fell inside the last few seconds.
//! Each history is capped so memory stays flat no matter how long the agent
//! runs. The cap must exceed the peak number of events one query window can
//! hold, otherwise the oldest in-window events are silently lost: the
//! defaults below assume a window of at most 10 seconds and no more than
//! 100 events per second.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Default capacity for keystroke timestamps.
pub const KEYSTROKE_HISTORY: usize = 1000;

/// Default capacity for click timestamps.
pub const CLICK_HISTORY: usize = 500;

/// Default capacity for pointer positions.
pub const POSITION_HISTORY: usize = 1000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking writer cannot leave a half-pushed timestamp behind, so the
    // data is still consistent after poisoning.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn window_start(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    if window <= Duration::zero() {
        return None;
    }
    now.checked_sub_signed(window)
}

/// Window length in fractional seconds.
pub(crate) fn window_secs(window: Duration) -> f64 {
    window.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0
}

/// A capacity-bounded, insertion-ordered buffer of event instants.
///
/// All access goes through one mutex, so a query never observes a partially
/// recorded event and producers on other threads may record concurrently.
#[derive(Debug)]
pub struct WindowedCounter {
    capacity: usize,
    events: Mutex<VecDeque<DateTime<Utc>>>,
}

impl WindowedCounter {
    /// Create a counter retaining at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record an event. The oldest event is dropped once the cap is reached.
    ///
    /// Timestamps are expected to be non-decreasing; a late timestamp is
    /// clamped to the newest retained one so the history stays ordered.
    pub fn record(&self, timestamp: DateTime<Utc>) {
        let mut events = lock(&self.events);
        let timestamp = match events.back() {
            Some(&last) if timestamp < last => last,
            _ => timestamp,
        };
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(timestamp);
    }

    /// Number of events with `timestamp > now - window`.
    ///
    /// An event exactly at the window boundary is excluded.
    pub fn count_in_window(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let Some(start) = window_start(now, window) else {
            return 0;
        };
        let events = lock(&self.events);
        // Newest events are at the back; stop at the first one outside.
        events.iter().rev().take_while(|&&t| t > start).count()
    }

    /// Events per second over the window ending at `now`.
    pub fn rate_in_window(&self, now: DateTime<Utc>, window: Duration) -> f64 {
        if window <= Duration::zero() {
            return 0.0;
        }
        self.count_in_window(now, window) as f64 / window_secs(window)
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all retained events.
    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

/// A pointer sample retained for movement-distance integration.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PositionSample {
    timestamp: DateTime<Utc>,
    x: f64,
    y: f64,
}

/// A bounded history of pointer positions.
///
/// Positions never leave this structure; only the integrated distance is
/// exposed.
#[derive(Debug)]
pub struct PositionTrail {
    capacity: usize,
    samples: Mutex<VecDeque<PositionSample>>,
}

impl PositionTrail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record a pointer position.
    pub fn record(&self, timestamp: DateTime<Utc>, x: f64, y: f64) {
        let mut samples = lock(&self.samples);
        let timestamp = match samples.back() {
            Some(last) if timestamp < last.timestamp => last.timestamp,
            _ => timestamp,
        };
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(PositionSample { timestamp, x, y });
    }

    /// Sum of Euclidean distances between consecutive positions whose
    /// timestamps fall inside the window.
    pub fn distance_in_window(&self, now: DateTime<Utc>, window: Duration) -> f64 {
        let Some(start) = window_start(now, window) else {
            return 0.0;
        };
        let samples = lock(&self.samples);
        let recent: Vec<&PositionSample> = samples.iter().filter(|s| s.timestamp > start).collect();

        recent
            .windows(2)
            .map(|pair| {
                let dx = pair[1].x - pair[0].x;
                let dy = pair[1].y - pair[0].y;
                (dx * dx + dy * dy).sqrt()
            })
            .sum()
    }

    /// Movement distance per second over the window ending at `now`.
    pub fn speed_in_window(&self, now: DateTime<Utc>, window: Duration) -> f64 {
        if window <= Duration::zero() {
            return 0.0;
        }
        self.distance_in_window(now, window) / window_secs(window)
    }

    pub fn len(&self) -> usize {
        lock(&self.samples).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.samples).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn secs(s: f64) -> Duration {
        Duration::milliseconds((s * 1000.0) as i64)
    }

    #[test]
    fn test_rate_counts_only_recent_events() {
        let counter = WindowedCounter::new(100);
        let start = t0();

        for i in 0..20 {
            counter.record(start + secs(i as f64));
        }

        // Window (9, 19]: events at 10..=19
        let now = start + secs(19.0);
        assert_eq!(counter.count_in_window(now, secs(10.0)), 10);
        assert!((counter.rate_in_window(now, secs(10.0)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_event_is_excluded() {
        let counter = WindowedCounter::new(10);
        let start = t0();
        counter.record(start);
        counter.record(start + secs(0.001));

        let now = start + secs(10.0);
        // The event exactly at now - window is outside; the one just after is in.
        assert_eq!(counter.count_in_window(now, secs(10.0)), 1);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let counter = WindowedCounter::new(5);
        let start = t0();
        for i in 0..8 {
            counter.record(start + secs(i as f64 * 0.1));
        }
        assert_eq!(counter.len(), 5);
        assert_eq!(counter.count_in_window(start + secs(1.0), secs(10.0)), 5);
    }

    #[test]
    fn test_zero_window_is_empty() {
        let counter = WindowedCounter::new(5);
        counter.record(t0());
        assert_eq!(counter.count_in_window(t0(), Duration::zero()), 0);
        assert_eq!(counter.rate_in_window(t0(), Duration::zero()), 0.0);
    }

    #[test]
    fn test_out_of_order_timestamp_is_clamped() {
        let counter = WindowedCounter::new(5);
        let start = t0();
        counter.record(start + secs(5.0));
        counter.record(start + secs(1.0));
        // Both are treated as happening at +5s.
        assert_eq!(counter.count_in_window(start + secs(6.0), secs(2.0)), 2);
    }

    #[test]
    fn test_concurrent_producers() {
        let counter = Arc::new(WindowedCounter::new(KEYSTROKE_HISTORY));
        let start = t0();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        counter.record(start);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.count_in_window(start + secs(1.0), secs(10.0)), 400);
    }

    #[test]
    fn test_position_trail_distance() {
        let trail = PositionTrail::new(POSITION_HISTORY);
        let start = t0();

        trail.record(start, 0.0, 0.0); // falls outside the window below
        trail.record(start + secs(6.0), 0.0, 0.0);
        trail.record(start + secs(7.0), 3.0, 4.0);
        trail.record(start + secs(8.0), 3.0, 10.0);

        let now = start + secs(10.0);
        let distance = trail.distance_in_window(now, secs(5.0));
        assert!((distance - 11.0).abs() < 1e-9);
        assert!((trail.speed_in_window(now, secs(5.0)) - 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_position_trail_single_point() {
        let trail = PositionTrail::new(10);
        trail.record(t0(), 5.0, 5.0);
        assert_eq!(trail.distance_in_window(t0() + secs(1.0), secs(10.0)), 0.0);
    }
}
