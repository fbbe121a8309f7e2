//! Monitoring orchestration.
//!
//! A [`Monitor`] ties the engine together for a running agent. The
//! monitoring thread calls [`Monitor::tick`] every few seconds; a separate,
//! slower thread calls [`Monitor::intent_tick`]. Both are safe to call from
//! any thread, and the control API reads state concurrently.

use crate::config::Config;
use crate::core::arbiter::{ArbiterEvent, InterventionArbiter, InterventionEvent};
use crate::core::auxiliary::CachedSignal;
use crate::core::fusion::{FusionState, StressFusionEngine};
use crate::core::intent::{
    ContextSource, IntentJudge, IntentMismatchTracker, IntentSettings, IntentState, MismatchEvent,
    Verdict,
};
use crate::core::report::{ReportBuilder, SessionReport};
use crate::core::sensor::{ActivitySettings, InputActivitySensor};
use crate::error::{EngineError, JudgeError};
use crate::providers::{CommandProvider, ScoreFormat};
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Intervention(InterventionEvent),
    CalmRestored { at: DateTime<Utc> },
    IntentMismatch(MismatchEvent),
}

/// Build the input activity sensor for a session.
///
/// Returns `None` when neither keyboard nor mouse is enabled. Without a
/// usable input tap (no platform listener, or permission denied) the sensor
/// is created unavailable, so fusion sees the input signal as disabled and
/// the remaining sources keep running.
pub fn build_input_sensor(
    config: &Config,
    tap_available: bool,
) -> Result<Option<Arc<InputActivitySensor>>, EngineError> {
    if !config.sources.input_enabled() {
        return Ok(None);
    }

    let settings = ActivitySettings::from_config(&config.detection)?;
    let sensor = if tap_available {
        InputActivitySensor::new(settings)
    } else {
        tracing::warn!("No input tap available, input activity disabled");
        InputActivitySensor::unavailable(settings)
    };
    Ok(Some(Arc::new(sensor)))
}

/// Judge wrapper that counts each judgment in the transparency log.
struct CountingJudge<'a> {
    inner: &'a dyn IntentJudge,
    log: &'a SharedTransparencyLog,
}

impl IntentJudge for CountingJudge<'_> {
    fn judge(&self, intent: &str, visual_context: &[u8]) -> Result<Verdict, JudgeError> {
        self.log.record_intent_check();
        self.inner.judge(intent, visual_context)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared monitoring state for one session.
pub struct Monitor {
    engine: StressFusionEngine,
    arbiter: Mutex<InterventionArbiter>,
    tracker: IntentMismatchTracker,
    latest: RwLock<Option<FusionState>>,
    report: Mutex<ReportBuilder>,
    log: SharedTransparencyLog,
    paused: AtomicBool,
}

impl Monitor {
    pub fn new(
        engine: StressFusionEngine,
        arbiter: InterventionArbiter,
        tracker: IntentMismatchTracker,
        log: SharedTransparencyLog,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            engine,
            arbiter: Mutex::new(arbiter),
            tracker,
            latest: RwLock::new(None),
            report: Mutex::new(ReportBuilder::new(started_at)),
            log,
            paused: AtomicBool::new(false),
        }
    }

    /// Build every engine component from the configuration.
    ///
    /// Breathing and posture are wired up only when their source is enabled
    /// and a provider command is configured.
    pub fn from_config(
        config: &Config,
        input: Option<Arc<InputActivitySensor>>,
        log: SharedTransparencyLog,
        started_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let mut engine = StressFusionEngine::new(input);

        if config.sources.breathing {
            match &config.breathing.command {
                Some(command) => match CommandProvider::new(
                    command,
                    ScoreFormat::breathing(&config.breathing),
                    config.breathing.timeout,
                ) {
                    Ok(provider) => {
                        engine = engine.with_breathing(Box::new(CachedSignal::new(
                            "breathing",
                            provider,
                            config.breathing.refresh_interval.as_secs_f64(),
                        )?));
                    }
                    Err(e) => tracing::warn!(error = %e, "Breathing provider disabled"),
                },
                None => tracing::warn!("Breathing enabled but no provider command configured"),
            }
        }

        if config.sources.posture {
            match &config.posture.command {
                Some(command) => match CommandProvider::new(
                    command,
                    ScoreFormat::posture(&config.posture),
                    config.posture.timeout,
                ) {
                    Ok(provider) => {
                        engine = engine.with_posture(Box::new(CachedSignal::new(
                            "posture",
                            provider,
                            config.posture.refresh_interval.as_secs_f64(),
                        )?));
                    }
                    Err(e) => tracing::warn!(error = %e, "Posture provider disabled"),
                },
                None => tracing::warn!("Posture enabled but no provider command configured"),
            }
        }

        let arbiter = InterventionArbiter::new(config.intervention.cooldown.as_secs_f64())?;
        let tracker = IntentMismatchTracker::new(IntentSettings::from_config(&config.intent)?);
        if let Some(intent) = config.intent.default_intent.as_deref() {
            if !intent.trim().is_empty() {
                tracker.set_intent(intent);
            }
        }

        let monitor = Self::new(engine, arbiter, tracker, log, started_at);
        monitor.set_paused(config.paused);
        Ok(monitor)
    }

    /// Evaluate one monitoring tick. No-op while paused.
    pub fn tick(&self, now: DateTime<Utc>) -> Option<MonitorEvent> {
        if self.is_paused() {
            return None;
        }

        // Providers may block up to their timeout; sample outside the lock.
        let scores = self.engine.sample(now);

        // Holding the arbiter lock across fusion and evaluation serializes
        // ticks, so the cooldown check and update are atomic.
        let (state, event) = {
            let mut arbiter = lock(&self.arbiter);
            let state = self.engine.fuse(scores, now, &arbiter);
            let event = arbiter.evaluate(&state, now);
            (state, event)
        };

        self.log.record_tick();
        {
            let mut report = lock(&self.report);
            report.record_state(&state);
            match &event {
                Some(ArbiterEvent::Intervention(intervention)) => {
                    report.record_intervention(intervention)
                }
                Some(ArbiterEvent::CalmRestored { at }) => report.record_calm_restored(*at),
                None => {}
            }
        }
        *self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(state);

        match event? {
            ArbiterEvent::Intervention(intervention) => {
                self.log.record_intervention();
                Some(MonitorEvent::Intervention(intervention))
            }
            ArbiterEvent::CalmRestored { at } => {
                self.log.record_calm_restored();
                Some(MonitorEvent::CalmRestored { at })
            }
        }
    }

    /// Run the intent check if one is due. No-op while paused.
    ///
    /// The judge is called without holding any monitor lock. Only checks
    /// that reach the judge are counted.
    pub fn intent_tick(
        &self,
        now: DateTime<Utc>,
        judge: &dyn IntentJudge,
        context: &dyn ContextSource,
    ) -> Option<MonitorEvent> {
        if self.is_paused() {
            return None;
        }

        let judge = CountingJudge {
            inner: judge,
            log: &self.log,
        };
        let mismatch = self.tracker.check(now, &judge, context)?;
        self.log.record_intent_mismatch();
        lock(&self.report).record_mismatch(&mismatch);
        Some(MonitorEvent::IntentMismatch(mismatch))
    }

    pub fn set_intent(&self, intent: &str) {
        self.tracker.set_intent(intent);
    }

    pub fn clear_intent(&self) {
        self.tracker.clear_intent();
    }

    pub fn intent_state(&self, now: DateTime<Utc>) -> IntentState {
        self.tracker.get_state(now)
    }

    pub fn tracker(&self) -> &IntentMismatchTracker {
        &self.tracker
    }

    /// Most recent fused state, `None` before the first tick.
    pub fn latest_state(&self) -> Option<FusionState> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn input_sensor(&self) -> Option<&Arc<InputActivitySensor>> {
        self.engine.input_sensor()
    }

    pub fn log(&self) -> &SharedTransparencyLog {
        &self.log
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        if self.paused.swap(paused, Ordering::SeqCst) != paused {
            tracing::info!(paused, "Monitoring pause state changed");
        }
    }

    /// Build the session report up to `now`.
    pub fn report(&self, now: DateTime<Utc>) -> SessionReport {
        lock(&self.report).build(now, Some(self.log.stats()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auxiliary::AuxiliarySignal;
    use crate::core::intent::Verdict;
    use crate::core::reading::Reading;
    use crate::core::sensor::ActivitySettings;
    use crate::error::JudgeError;
    use crate::transparency::create_shared_log;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    struct Scores(Vec<f64>, std::sync::atomic::AtomicUsize);

    impl AuxiliarySignal for Scores {
        fn name(&self) -> &str {
            "scripted"
        }

        fn get_score(&self, _now: DateTime<Utc>) -> Reading<f64> {
            let i = self.1.fetch_add(1, Ordering::SeqCst);
            Reading::Enabled(self.0.get(i).copied().unwrap_or(0.0))
        }
    }

    fn monitor_with(breathing: Vec<f64>, posture: Vec<f64>) -> Monitor {
        let engine = StressFusionEngine::new(None)
            .with_breathing(Box::new(Scores(breathing, Default::default())))
            .with_posture(Box::new(Scores(posture, Default::default())));
        let tracker = IntentMismatchTracker::new(IntentSettings::new(30.0, 1.0).unwrap());
        tracker.start();
        Monitor::new(
            engine,
            InterventionArbiter::new(120.0).unwrap(),
            tracker,
            create_shared_log(),
            t0(),
        )
    }

    struct Judge(bool);

    impl IntentJudge for Judge {
        fn judge(&self, _intent: &str, _context: &[u8]) -> Result<Verdict, JudgeError> {
            Ok(Verdict {
                matches: self.0,
                explanation: "screen".to_string(),
            })
        }
    }

    struct Screen;

    impl ContextSource for Screen {
        fn capture(&self) -> Option<Vec<u8>> {
            Some(vec![1, 2, 3])
        }
    }

    #[test]
    fn test_tick_fires_and_records() {
        let sensor = Arc::new(InputActivitySensor::new(
            ActivitySettings::new(10.0, 300.0, 50).unwrap(),
        ));
        sensor.start(t0());
        for i in 0..50 {
            sensor.on_key_event(t0() + Duration::milliseconds(i * 100));
        }

        let engine = StressFusionEngine::new(Some(Arc::clone(&sensor)))
            .with_breathing(Box::new(Scores(vec![100.0, 0.0], Default::default())))
            .with_posture(Box::new(Scores(vec![100.0, 0.0], Default::default())));
        let monitor = Monitor::new(
            engine,
            InterventionArbiter::new(120.0).unwrap(),
            IntentMismatchTracker::new(IntentSettings::new(30.0, 1.0).unwrap()),
            create_shared_log(),
            t0(),
        );
        assert_eq!(monitor.latest_state(), None);

        // Calibration holds back stress reports, not interventions.
        assert!(sensor.is_calibrating(t0() + Duration::seconds(5)));
        let event = monitor.tick(t0() + Duration::seconds(5));
        assert!(matches!(event, Some(MonitorEvent::Intervention(_))));
        assert!((monitor.latest_state().unwrap().score - 100.0).abs() < 1e-9);

        // Typing has left the window and the auxiliary scores dropped.
        let event = monitor.tick(t0() + Duration::seconds(30));
        assert_eq!(
            event,
            Some(MonitorEvent::CalmRestored {
                at: t0() + Duration::seconds(30)
            })
        );

        let stats = monitor.log().stats();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.interventions, 1);
        assert_eq!(stats.calm_restorations, 1);

        let report = monitor.report(t0() + Duration::seconds(60));
        assert_eq!(report.interventions.len(), 1);
        assert_eq!(report.calm_restorations.len(), 1);
    }

    #[test]
    fn test_paused_monitor_is_inert() {
        let monitor = monitor_with(vec![100.0], vec![100.0]);
        monitor.set_paused(true);
        monitor.set_intent("writing");

        assert_eq!(monitor.tick(t0()), None);
        assert_eq!(monitor.intent_tick(t0(), &Judge(false), &Screen), None);
        assert_eq!(monitor.log().stats().ticks, 0);
        assert_eq!(monitor.latest_state(), None);
    }

    #[test]
    fn test_intent_tick_reports_mismatch() {
        let monitor = monitor_with(vec![], vec![]);
        monitor.set_intent("debugging");

        let judge = Judge(false);
        let mut events = Vec::new();
        for i in 0..5 {
            if let Some(event) = monitor.intent_tick(t0() + Duration::seconds(30 * i), &judge, &Screen)
            {
                events.push(event);
            }
        }

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], MonitorEvent::IntentMismatch(m) if m.intent == "debugging"));

        let stats = monitor.log().stats();
        assert_eq!(stats.intent_checks, 5);
        assert_eq!(stats.intent_mismatches, 1);
        assert_eq!(monitor.report(t0() + Duration::minutes(3)).total_mismatches(), 1);
    }

    struct NoScreen;

    impl ContextSource for NoScreen {
        fn capture(&self) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn test_intent_tick_counts_only_judged_checks() {
        let monitor = monitor_with(vec![], vec![]);
        monitor.set_intent("debugging");

        assert_eq!(monitor.intent_tick(t0(), &Judge(true), &NoScreen), None);
        assert_eq!(monitor.log().stats().intent_checks, 0);

        // The empty capture still consumed the interval.
        assert_eq!(
            monitor.intent_tick(t0() + Duration::seconds(10), &Judge(true), &Screen),
            None
        );
        assert_eq!(monitor.log().stats().intent_checks, 0);

        assert_eq!(
            monitor.intent_tick(t0() + Duration::seconds(30), &Judge(true), &Screen),
            None
        );
        assert_eq!(monitor.log().stats().intent_checks, 1);
        assert!(monitor.intent_state(t0() + Duration::seconds(30)).last_match);
    }

    #[test]
    fn test_denied_input_tap_disables_input_only() {
        let mut config = Config::default();
        config.sources = crate::config::SourceConfig::from_csv("keyboard,mouse");

        let sensor = build_input_sensor(&config, false).unwrap().unwrap();
        assert!(!sensor.is_available());
        assert!(!sensor.start(t0()));

        let engine = StressFusionEngine::new(Some(Arc::clone(&sensor)))
            .with_breathing(Box::new(Scores(vec![100.0], Default::default())));
        let monitor = Monitor::new(
            engine,
            InterventionArbiter::new(120.0).unwrap(),
            IntentMismatchTracker::new(IntentSettings::new(30.0, 1.0).unwrap()),
            create_shared_log(),
            t0(),
        );
        monitor.tick(t0() + Duration::seconds(5));

        let state = monitor.latest_state().unwrap();
        assert_eq!(state.input, Reading::Disabled);
        assert_eq!(state.breathing, Reading::Enabled(100.0));
        assert!((state.score - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_input_sensor_follows_sources_and_tap() {
        let mut config = Config::default();
        config.sources = crate::config::SourceConfig::from_csv("breathing");
        assert!(build_input_sensor(&config, true).unwrap().is_none());

        config.sources = crate::config::SourceConfig::from_csv("keyboard");
        let sensor = build_input_sensor(&config, true).unwrap().unwrap();
        assert!(sensor.is_available());
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_provider_does_not_hold_arbiter() {
        let mut config = Config::default();
        config.sources = crate::config::SourceConfig::from_csv("breathing");
        config.breathing.command = Some("sleep 5; echo 10".to_string());
        config.breathing.timeout = std::time::Duration::from_millis(200);

        let monitor = Monitor::from_config(&config, None, create_shared_log(), t0()).unwrap();
        let started = std::time::Instant::now();
        assert_eq!(monitor.tick(t0()), None);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(monitor.latest_state().unwrap().breathing, Reading::Disabled);
    }

    #[test]
    fn test_from_config_applies_default_intent() {
        let mut config = Config::default();
        config.intent.default_intent = Some("reading papers".to_string());
        config.paused = true;

        let monitor = Monitor::from_config(&config, None, create_shared_log(), t0()).unwrap();
        assert!(monitor.is_paused());
        assert_eq!(monitor.intent_state(t0()).current_intent, "reading papers");
    }
}
