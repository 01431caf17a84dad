//! Daemon configuration.
//!
//! ```toml
//! token = "..."            # or DISCORD_TOKEN
//! log_filter = "info"      # RUST_LOG wins when set
//!
//! [supervisor]
//! recovery_timeout_secs = 15
//! attempt_reset = true
//!
//! [handlers]
//! disabled = ["voice_activity"]
//! ```

use crate::handlers;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_core::SupervisorConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub token: String,
    pub log_filter: String,
    pub supervisor: SupervisorSection,
    pub handlers: HandlersSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            log_filter: "info".into(),
            supervisor: SupervisorSection::default(),
            handlers: HandlersSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSection {
    pub recovery_timeout_secs: u64,
    pub attempt_reset: bool,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            recovery_timeout_secs: defaults.recovery_timeout.as_secs(),
            attempt_reset: defaults.attempt_reset,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlersSection {
    /// Handler names left out of the registry.
    pub disabled: Vec<String>,
}

impl Config {
    /// Load from `path`, or defaults if no path was given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.supervisor.recovery_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if let Some(unknown) = self
            .handlers
            .disabled
            .iter()
            .find(|name| !handlers::NAMES.contains(&name.as_str()))
        {
            return Err(ConfigError::UnknownHandler(unknown.clone()));
        }
        Ok(())
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            recovery_timeout: Duration::from_secs(self.supervisor.recovery_timeout_secs),
            attempt_reset: self.supervisor.attempt_reset,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no bot token configured (set DISCORD_TOKEN or `token`)")]
    MissingToken,
    #[error("supervisor.recovery_timeout_secs must be greater than zero")]
    ZeroTimeout,
    #[error("unknown handler in handlers.disabled: {0}")]
    UnknownHandler(String),
}
