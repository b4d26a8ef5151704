//! Command-line client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via IGNITE_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use ignite_client::ConnectionConfig;
use ignite_protocol::{ProtocolVersion, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node host name or address.
    pub host: String,
    /// Node thin client port.
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Protocol version proposed in the handshake.
    pub protocol_version: ProtocolVersion,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            protocol_version: ProtocolVersion::default(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or IGNITE_CONFIG), then applies
    /// environment variable overrides.
    ///
    /// Not validated here: command-line flags may still complete the
    /// settings, so callers run [`Config::validate`] once everything is layered.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("IGNITE_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("IGNITE_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("IGNITE_PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::Validation(format!("invalid IGNITE_PORT '{}'", port)))?;
        }

        if let Ok(username) = std::env::var("IGNITE_USERNAME") {
            self.username = Some(username);
        }

        if let Ok(password) = std::env::var("IGNITE_PASSWORD") {
            self.password = Some(password);
        }

        if let Ok(version) = std::env::var("IGNITE_PROTOCOL_VERSION") {
            self.protocol_version = version.parse().map_err(|_| {
                ConfigError::Validation(format!("invalid IGNITE_PROTOCOL_VERSION '{}'", version))
            })?;
        }
        Ok(())
    }

    /// Checks settings the node would otherwise reject at handshake time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".into()));
        }
        if !self.protocol_version.is_supported() {
            return Err(ConfigError::Validation(format!(
                "unsupported protocol version {}",
                self.protocol_version
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::Validation(
                "username and password must be set together".into(),
            ));
        }
        if self.username.is_some() && !self.protocol_version.supports_auth() {
            return Err(ConfigError::Validation(format!(
                "authentication requires protocol 1.1.0 or later, got {}",
                self.protocol_version
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Builds the session configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.host.clone(), self.port)
            .with_connect_timeout(self.connect_timeout())
            .with_request_timeout(self.request_timeout())
            .with_protocol_version(self.protocol_version);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            config = config.with_credentials(user.clone(), pass.clone());
        }
        config
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
