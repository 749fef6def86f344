//! RON-driven client configuration.
//!
//! ```ron
//! (
//!     namespace: "dapp",
//!     read_timeout_ms: 3000,
//!     signal_capacity: 64,
//! )
//! ```
//!
//! Every field is optional; omitted fields take the defaults from
//! [`constants`](crate::constants).

use std::path::{Path, PathBuf};
use std::time::Duration;

use nakama_store::StoreLayout;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_NAMESPACE, DEFAULT_READ_TIMEOUT, DEFAULT_SIGNAL_CAPACITY,
};

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Application namespace in the graph store.
    pub namespace: String,
    /// Bound on each one-shot store read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Capacity of the block signal bus.
    pub signal_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            signal_capacity: DEFAULT_SIGNAL_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&text)
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// `$XDG_CONFIG_HOME/nakama/client.ron` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nakama").join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be positive".into()));
        }
        if self.signal_capacity == 0 {
            return Err(ConfigError::Invalid("signal_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(self.namespace.clone())
    }
}
