//! Configuration management

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    /// Shared bearer token required on both WebSocket routes when set.
    pub access_token: Option<String>,
    /// Frames buffered per connected endpoint before senders wait.
    pub endpoint_queue_capacity: usize,
    /// Status frames buffered per supervisor before it starts skipping.
    pub status_channel_capacity: usize,
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8787)),
            access_token: None,
            endpoint_queue_capacity: 256,
            status_channel_capacity: 64,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Defaults, then the TOML file (if any), then `RCS_RELAY_*` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = std::env::var("RCS_RELAY_LISTEN_ADDR") {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
        }
        if let Ok(token) = std::env::var("RCS_RELAY_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
        if let Ok(level) = std::env::var("RCS_RELAY_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "endpoint_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.status_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "status_channel_capacity must be > 0".to_string(),
            ));
        }
        if matches!(&self.access_token, Some(t) if t.trim().is_empty()) {
            return Err(ConfigError::Invalid("access_token must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr = \"127.0.0.1:9000\"").unwrap();
        writeln!(file, "access_token = \"s3cret\"").unwrap();
        let config = RelayConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.access_token.as_deref(), Some("s3cret"));
        assert_eq!(config.endpoint_queue_capacity, 256);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = RelayConfig {
            endpoint_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
