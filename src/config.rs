//! Configuration module
//!
//! Loaded from a TOML file (default `~/.config/ocpp-central/config.toml`).
//! Every section and field has a default, so a partial file or no file at
//! all still yields a runnable configuration.
//!
//! ```toml
//! [server]
//! ws_port = 9000
//!
//! [ocpp]
//! heartbeat_interval = 10
//! idle_timeout_secs = 300
//!
//! [[id_tags]]
//! idTag = "TAG1"
//! status = "Accepted"
//! expiryDate = "2030-01-01T00:00:00Z"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::AuthorizationRecord;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default config location: `<config dir>/ocpp-central/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-central")
        .join("config.toml")
}

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ocpp: OcppConfig,
    pub logging: LoggingConfig,
    /// Authorization records seeded into the in-memory store
    pub id_tags: Vec<AuthorizationRecord>,
}

impl AppConfig {
    /// Load and validate a config file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ocpp.heartbeat_interval == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.heartbeat_interval must be a positive number of seconds".into(),
            ));
        }
        if self.ocpp.idle_timeout_secs == 0
            || self.ocpp.call_timeout_secs == 0
            || self.ocpp.handshake_timeout_secs == 0
        {
            return Err(ConfigError::Invalid(
                "ocpp.idle_timeout_secs, ocpp.call_timeout_secs and ocpp.handshake_timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ws_host: String,
    pub ws_port: u16,
    pub api_host: String,
    pub api_port: u16,
    /// Seconds to wait for sessions to close on shutdown
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }

    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_host: "0.0.0.0".to_string(),
            ws_port: 9000,
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            shutdown_timeout: 10,
        }
    }
}

/// Protocol engine policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcppConfig {
    /// Heartbeat interval handed out in BootNotification responses (seconds)
    pub heartbeat_interval: u32,
    /// Close a session after this long without any frame
    pub idle_timeout_secs: u64,
    /// How long a server-initiated Call waits for its response
    pub call_timeout_secs: u64,
    /// Refuse clients that do not offer any sub-protocol
    pub require_subprotocol: bool,
    /// Drop TCP connections that have not completed the WebSocket upgrade
    /// within this many seconds
    pub handshake_timeout_secs: u64,
}

impl OcppConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for OcppConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: 10,
            idle_timeout_secs: 300,
            call_timeout_secs: 30,
            require_subprotocol: false,
            handshake_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive, e.g. `info` or `ocpp_central=debug`
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
