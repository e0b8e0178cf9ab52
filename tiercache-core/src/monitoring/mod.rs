//! Monitoring for TierCache
//!
//! - Structured logging with tracing
//! - Per-instance operation statistics

pub mod logging;
pub mod stats;

pub use logging::*;
pub use stats::*;
