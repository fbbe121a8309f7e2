//! Transparency module for the Sati sensor agent.
//!
//! Tracks and exposes what the agent observes and decides, so the user can
//! verify that nothing beyond timing and counts is retained.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
