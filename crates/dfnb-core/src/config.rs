//! Notebook core configuration

use crate::error::ConfigError;
use dfnb_ident::DEFAULT_SHORT_LEN;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Logging settings for the `dfnb` binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Core configuration
///
/// Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataflowConfig {
    /// Minimum truncated identifier length
    pub short_id_len: usize,
    /// Logging
    pub logging: LoggingConfig,
}

impl Default for DataflowConfig {
    fn default() -> Self {
        Self {
            short_id_len: DEFAULT_SHORT_LEN,
            logging: LoggingConfig::default(),
        }
    }
}

impl DataflowConfig {
    /// Parse from TOML text; missing keys take defaults
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
