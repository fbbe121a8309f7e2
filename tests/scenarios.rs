//! End-to-end engine scenarios driven by synthetic timestamps.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use sati_sensor_agent::core::{
    ActivitySettings, ArbiterEvent, ContextSource, FusionState, InputActivitySensor,
    IntentJudge, IntentMismatchTracker, IntentSettings, InterventionArbiter, Reading,
    StressLevel, Verdict, WindowedCounter,
};
use sati_sensor_agent::JudgeError;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

struct Judge(fn() -> Result<Verdict, JudgeError>);

impl IntentJudge for Judge {
    fn judge(&self, _intent: &str, _visual_context: &[u8]) -> Result<Verdict, JudgeError> {
        (self.0)()
    }
}

struct StaticFrame;

impl ContextSource for StaticFrame {
    fn capture(&self) -> Option<Vec<u8>> {
        Some(vec![0xFF, 0xD8, 0xFF])
    }
}

fn input_only(score: f64) -> FusionState {
    FusionState::from_scores(
        Reading::Enabled(score),
        Reading::Disabled,
        Reading::Disabled,
        None,
        true,
    )
}

#[test]
fn sustained_mismatch_fires_once_at_threshold() {
    let tracker = IntentMismatchTracker::new(IntentSettings::new(30.0, 120.0).unwrap());
    tracker.start();
    tracker.set_intent("debugging");

    let judge = Judge(|| Ok(Verdict::mismatching("social media")));
    let mut fired = Vec::new();

    // 125 minutes of checks every 30 seconds
    for i in 0..=250 {
        let now = t0() + Duration::seconds(30 * i);
        if let Some(event) = tracker.check(now, &judge, &StaticFrame) {
            fired.push(event);
        }
    }

    assert_eq!(fired.len(), 1);
    let event = &fired[0];
    assert_eq!(event.intent, "debugging");
    assert_eq!(event.explanation, "social media");
    assert_eq!(event.at, t0() + Duration::minutes(120));

    let state = tracker.get_state(t0() + Duration::minutes(125));
    assert!(!state.last_match);
    assert_eq!(state.mismatch_duration, 125.0 * 60.0);
}

#[test]
fn unreachable_judge_never_fires() {
    let tracker = IntentMismatchTracker::new(IntentSettings::new(30.0, 2.0).unwrap());
    tracker.start();
    tracker.set_intent("writing the design doc");

    let judge = Judge(|| Err(JudgeError::Unavailable("connection refused".to_string())));

    for i in 0..=360 {
        let now = t0() + Duration::seconds(30 * i);
        assert!(tracker.check(now, &judge, &StaticFrame).is_none());
    }

    let state = tracker.get_state(t0() + Duration::hours(3));
    assert!(state.last_match);
    assert_eq!(state.mismatch_duration, 0.0);
}

#[test]
fn driving_faster_than_check_interval_is_harmless() {
    let tracker = IntentMismatchTracker::new(IntentSettings::new(30.0, 2.0).unwrap());
    tracker.start();
    tracker.set_intent("reviewing pull requests");

    let judge = Judge(|| Ok(Verdict::mismatching("video site")));
    let mut fired = 0;

    // One call per second for ten minutes
    for i in 0..600 {
        if tracker
            .check(t0() + Duration::seconds(i), &judge, &StaticFrame)
            .is_some()
        {
            fired += 1;
        }
    }

    assert_eq!(fired, 1);
}

#[test]
fn cooldown_is_a_hard_floor() {
    let mut arbiter = InterventionArbiter::new(120.0).unwrap();
    let critical = FusionState::from_scores(
        Reading::Enabled(100.0),
        Reading::Enabled(100.0),
        Reading::Enabled(100.0),
        None,
        true,
    );
    assert_eq!(critical.level, StressLevel::Critical);

    assert!(matches!(
        arbiter.evaluate(&critical, t0()),
        Some(ArbiterEvent::Intervention(_))
    ));

    for secs in [2, 60, 119, 120] {
        assert_eq!(
            arbiter.evaluate(&critical, t0() + Duration::seconds(secs)),
            None,
            "fired {secs}s after the previous intervention"
        );
    }

    assert!(matches!(
        arbiter.evaluate(&critical, t0() + Duration::seconds(121)),
        Some(ArbiterEvent::Intervention(_))
    ));
}

#[test]
fn calm_restored_once_after_elevation() {
    let mut arbiter = InterventionArbiter::new(120.0).unwrap();
    // Input at 100 alone gives 50 (MODERATE); the composite needs breathing
    // and posture to reach HIGH.
    let high = FusionState::from_scores(
        Reading::Enabled(80.0),
        Reading::Enabled(70.0),
        Reading::Enabled(50.0),
        None,
        true,
    );
    assert_eq!(high.level, StressLevel::High);
    let calm = input_only(10.0);

    let sequence = [&calm, &calm, &high, &calm];
    let events: Vec<Option<ArbiterEvent>> = sequence
        .iter()
        .enumerate()
        .map(|(i, state)| arbiter.evaluate(state, t0() + Duration::seconds(2 * i as i64)))
        .collect();

    assert_eq!(events[0], None);
    assert_eq!(events[1], None);
    assert!(matches!(events[2], Some(ArbiterEvent::Intervention(_))));
    assert_eq!(
        events[3],
        Some(ArbiterEvent::CalmRestored {
            at: t0() + Duration::seconds(6)
        })
    );

    let restorations = events
        .iter()
        .filter(|e| matches!(e, Some(ArbiterEvent::CalmRestored { .. })))
        .count();
    assert_eq!(restorations, 1);

    // Staying calm does not restore again
    assert_eq!(arbiter.evaluate(&calm, t0() + Duration::seconds(8)), None);
}

#[test]
fn calibration_suppresses_stress_reports() {
    let sensor = InputActivitySensor::new(ActivitySettings::new(10.0, 300.0, 50).unwrap());
    sensor.start(t0());

    let burst = |start: DateTime<Utc>| {
        for i in 0..60 {
            sensor.on_key_event(start + Duration::milliseconds(100 * i));
        }
    };

    burst(t0() + Duration::seconds(100));
    let during = t0() + Duration::seconds(106);
    assert!(sensor.is_calibrating(during));
    assert_eq!(sensor.check_stress(during), None);
    assert!(sensor.baseline_sample_count() > 0);

    burst(t0() + Duration::seconds(400));
    let after = t0() + Duration::seconds(406);
    assert!(!sensor.is_calibrating(after));
    assert_eq!(sensor.check_stress(after), Some(100.0));
}

#[test]
fn window_boundary_is_exclusive() {
    let counter = WindowedCounter::new(100);
    let window = Duration::seconds(10);
    let now = t0() + window;

    counter.record(t0());
    assert_eq!(counter.count_in_window(now, window), 0);

    counter.record(t0() + Duration::milliseconds(1));
    assert_eq!(counter.count_in_window(now, window), 1);
    assert_eq!(counter.rate_in_window(now, window), 0.1);
}

#[test]
fn fusion_is_deterministic() {
    let build = || {
        FusionState::from_scores(
            Reading::Enabled(64.0),
            Reading::Enabled(33.3),
            Reading::Disabled,
            Some(t0()),
            false,
        )
    };

    assert_eq!(build(), build());
}
