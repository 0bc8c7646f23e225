//! Test infrastructure for the reconciling instance cache
//!
//! Provides:
//! - A scriptable mock factory with per-identifier failure injection
//! - Releasers whose calls are observable through trackers
//! - Gates for holding constructions or releases in flight
//! - An event recorder and tracing setup
//! - Polling helpers for effects that cross tasks

pub mod fixtures;
mod logging;
mod verification;

pub use fixtures::*;
pub use logging::*;
pub use verification::*;
