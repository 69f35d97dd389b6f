//! Subscriber bootstrap for binaries and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::ConfigError;

/// Installs a global `tracing` subscriber filtered by `level`, which accepts
/// any `EnvFilter` directive (`info`, `soulstore=debug,warn`, ...).
pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(level).map_err(|e| ConfigError::Invalid {
        field: "log_level",
        reason: e.to_string(),
    })?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| ConfigError::Invalid {
            field: "log_level",
            reason: "logging already initialized".into(),
        })
}
