//! Tracing subscriber setup
//!
//! Library code only emits events; binaries call [`init`] once.

use crate::config::LoggingConfig;
use crate::error::ConfigError;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// `RUST_LOG` overrides `config.level` when set.
///
/// # Errors
/// - [`ConfigError::LogFilter`] if `config.level` is not a valid directive
/// - [`ConfigError::LoggingInstalled`] if a subscriber already exists
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|_| ConfigError::LogFilter(config.level.clone()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|_| ConfigError::LoggingInstalled)?;

    tracing::debug!(json = config.json, "tracing initialized");
    Ok(())
}
