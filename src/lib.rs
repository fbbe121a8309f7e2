//! Sati Sensor Agent - privacy-first stress sensing for deep work.
//!
//! The agent watches how you work, never what you type, and steps in when
//! the pace suggests stress or when the screen has drifted away from what
//! you said you were doing.
//!
//! # Privacy Guarantees
//!
//! - **No key content**: only the timing of key presses is observed
//! - **No stored positions**: pointer positions live in memory for a few
//!   seconds, only to measure travelled distance
//! - **No stored screenshots**: a screenshot is judged by a local model and
//!   dropped; only the yes/no verdict is kept
//! - **Transparency**: all collection is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Sati Sensor Agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌──────────┐   ┌─────────┐ │
//! │  │ Collector │──▶│   Input    │──▶│  Fusion  │──▶│ Arbiter │ │
//! │  │  (macOS)  │   │  Activity  │   │ (0.5/.3/ │   │(cooldown│ │
//! │  └───────────┘   └────────────┘   │   .2)    │   └─────────┘ │
//! │  ┌───────────┐                    │          │               │
//! │  │ Breathing │───────────────────▶│          │               │
//! │  │  Posture  │                    └──────────┘               │
//! │  └───────────┘                                               │
//! │  ┌───────────┐   ┌────────────┐   ┌──────────┐               │
//! │  │  Screen   │──▶│ Local judge│──▶│  Intent  │               │
//! │  │ (context) │   │  (Ollama)  │   │ tracker  │               │
//! │  └───────────┘   └────────────┘   └──────────┘               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use sati_sensor_agent::config::Config;
//! use sati_sensor_agent::monitor::Monitor;
//! use sati_sensor_agent::transparency::create_shared_log;
//!
//! let config = Config::default();
//! let monitor = Monitor::from_config(&config, None, create_shared_log(), Utc::now())
//!     .expect("valid configuration");
//!
//! if let Some(event) = monitor.tick(Utc::now()) {
//!     println!("{event:?}");
//! }
//! ```

pub mod ai;
pub mod collector;
pub mod config;
pub mod core;
pub mod error;
pub mod monitor;
pub mod providers;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorConfig, CollectorError, SensorEvent};
pub use config::{Config, SourceConfig};
pub use core::{
    FusionState, InputActivitySensor, InterventionArbiter, IntentMismatchTracker, Reading,
    SessionReport, StressFusionEngine, StressLevel,
};
pub use error::{EngineError, JudgeError, SignalError};
pub use monitor::{Monitor, MonitorEvent};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

#[cfg(feature = "ollama")]
pub use ai::{BlockingOllamaClient, OllamaClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║             SATI SENSOR AGENT - PRIVACY DECLARATION              ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent estimates stress from how you work.                  ║
║                                                                  ║
║  ✓ WHAT WE OBSERVE:                                              ║
║    • When keys are pressed (timing only)                         ║
║    • When clicks occur and how far the pointer travels           ║
║    • Breathing and posture scores from your own provider tools   ║
║    • Whether the screen matches your declared intent (yes/no)    ║
║                                                                  ║
║  ✗ WHAT WE NEVER KEEP:                                           ║
║    • Which keys you press (no passwords, messages, etc.)         ║
║    • Pointer positions (held a few seconds for distance only)    ║
║    • Screenshots (judged by a local model, then dropped)         ║
║    • Audio or video                                              ║
║                                                                  ║
║  All processing is local. No data leaves this machine.           ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    sati-sensor status                                            ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
