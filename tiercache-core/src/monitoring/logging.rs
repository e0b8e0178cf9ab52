//! Structured logging with tracing
//!
//! The library only emits events. Binaries and tests that want to see them
//! call [`init_logging`] once at startup. Events go to stderr so stdout stays
//! free for command output. Slow store operations are reported on their own
//! target so they can be silenced or raised independently.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Target used for slow store operation warnings
pub const SLOW_OP_TARGET: &str = "slow_store_op";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub level: String,

    /// Emit one JSON object per event
    pub json_format: bool,

    /// Report store operations slower than `storage.slow_op_threshold_ms`
    pub slow_ops: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            json_format: false,
            slow_ops: true,
        }
    }
}

impl LoggingConfig {
    /// Configured level, INFO when unrecognized
    pub fn parse_level(&self) -> Level {
        self.level.trim().parse().unwrap_or(Level::INFO)
    }

    /// Filter directives used when `RUST_LOG` is not set
    pub fn directives(&self) -> String {
        let level = self.parse_level().as_str().to_lowercase();
        let slow = if self.slow_ops { "warn" } else { "off" };
        format!("{},{}={}", level, SLOW_OP_TARGET, slow)
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configuration. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())
            .with_context(|| format!("Invalid log level '{}'", config.level))?,
    };

    let registry = Registry::default().with(filter);
    let installed = if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    };
    installed.context("A global tracing subscriber is already installed")?;

    tracing::debug!(
        level = %config.level,
        json = config.json_format,
        "Logging initialized"
    );
    Ok(())
}
