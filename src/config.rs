//! Pool configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.offload.toml`)
//! 2. Environment variables (with `OFFLOAD_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [pool]
//! size = 8
//! acquire_timeout_ms = 30000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::host;

/// Members created when neither the config nor the host names a size.
pub const FALLBACK_POOL_SIZE: usize = 4;

/// Default time a pool acquisition may wait for a member (5 minutes).
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".offload.toml";

/// Configuration for a [`Pool`](crate::Pool).
///
/// # Examples
///
/// ```
/// use offload::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::default().with_size(2).with_acquire_timeout_ms(30);
/// assert_eq!(config.effective_size(), 2);
/// assert_eq!(config.acquire_timeout(), Duration::from_millis(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of members. `None` means the host's parallelism hint.
    pub size: Option<usize>,

    /// How long an acquisition waits for a member before failing.
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: None,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl PoolConfig {
    /// Load configuration from `.offload.toml` (if present) and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML configuration file
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            pool: PoolConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(full.pool)
    }

    /// Sets the member count.
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the acquisition timeout in milliseconds.
    #[must_use]
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Member count after falling back to the host hint, never below one.
    pub fn effective_size(&self) -> usize {
        self.size
            .or_else(host::available_parallelism)
            .unwrap_or(FALLBACK_POOL_SIZE)
            .max(1)
    }

    /// The acquisition timeout as a [`Duration`].
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("OFFLOAD_POOL_SIZE") {
            if let Ok(v) = size.parse() {
                self.size = Some(v);
            }
        }

        if let Ok(timeout) = std::env::var("OFFLOAD_ACQUIRE_TIMEOUT_MS") {
            if let Ok(v) = timeout.parse() {
                self.acquire_timeout_ms = v;
            }
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {error}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error message.
        error: String,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
