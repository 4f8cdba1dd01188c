//! Daemon configuration.
//!
//! Loaded from a TOML file; every key is optional.
//!
//! ```toml
//! listen_addr = "0.0.0.0:8080"
//! database_path = "/var/lib/aspm/aspm.db"
//! busy_timeout_ms = 5000
//! max_body_bytes = 67108864
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreOptions;

/// Settings for the ingestion daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// `SQLite` database file. An in-memory database is used when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// How long a write waits for another connection's lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Largest accepted request body. Collect bodies embed whole reports.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

const fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024 // 64 MiB
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, contains unknown keys or
    /// fails [`DaemonConfig::validate`].
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self
            .database_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(ConfigError::Validation(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Store tuning derived from this configuration.
    pub const fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
