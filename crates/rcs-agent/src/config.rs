use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use rcs_proto::v1::ClientId;
use rcs_proto::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base WebSocket URL of the relay, e.g. `ws://relay.example:8787`.
    pub relay_url: String,
    pub relay_token: Option<String>,

    // Endpoint identity
    pub client_id: String,
    pub display_name: String,

    // Session runtime
    pub tick_interval_ms: u64,
    pub input_budget_per_tick: usize,
    pub session_queue_capacity: usize,
    pub input_queue_capacity: usize,
    pub status_queue_capacity: usize,

    // Relay reconnect backoff
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,

    pub consent: ConsentConfig,

    // Logging
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs.
    pub log_json: bool,
    pub log_file: Option<PathBuf>,
}

/// Loopback endpoint shared with the consent surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    pub bind_addr: SocketAddr,
    /// Bearer token; generated at startup when unset.
    pub token: Option<String>,
    /// Directory holding the bridge keys and the generated token file.
    pub bridge_dir: PathBuf,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 47115)),
            token: None,
            bridge_dir: rcs_core::consent::default_bridge_dir()
                .unwrap_or_else(|| PathBuf::from("consent-bridge")),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        let host = std::env::var("COMPUTERNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "endpoint".to_string());
        Self {
            relay_url: "ws://127.0.0.1:8787".to_string(),
            relay_token: None,
            client_id: host.to_lowercase(),
            display_name: host,
            tick_interval_ms: 250,
            input_budget_per_tick: 64,
            session_queue_capacity: 32,
            input_queue_capacity: 256,
            status_queue_capacity: 64,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            consent: ConsentConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
            log_file: None,
        }
    }
}

impl AgentConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let mut config: AgentConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("RCS_RELAY_URL") {
            self.relay_url = url;
        }
        if let Ok(token) = std::env::var("RCS_RELAY_TOKEN") {
            self.relay_token = Some(token);
        }
        if let Ok(id) = std::env::var("RCS_CLIENT_ID") {
            self.client_id = id;
        }
        if let Ok(name) = std::env::var("RCS_DISPLAY_NAME") {
            self.display_name = name;
        }
        if let Ok(addr) = std::env::var("RCS_CONSENT_BIND_ADDR") {
            if let Ok(addr) = addr.parse() {
                self.consent.bind_addr = addr;
            }
        }
        if let Ok(token) = std::env::var("RCS_CONSENT_TOKEN") {
            self.consent.token = Some(token);
        }
        if let Ok(dir) = std::env::var("RCS_BRIDGE_DIR") {
            self.consent.bridge_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = level;
        }
        if let Ok(json) = std::env::var("RCS_LOG_JSON") {
            self.log_json = matches!(json.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn client_id(&self) -> ClientId {
        ClientId::new(self.client_id.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(
                "relay_url must be a ws:// or wss:// URL".to_string(),
            ));
        }
        self.client_id()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if self.display_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "display_name must not be empty".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.input_budget_per_tick == 0
            || self.session_queue_capacity == 0
            || self.input_queue_capacity == 0
            || self.status_queue_capacity == 0
        {
            return Err(ConfigError::ValidationError(
                "queue capacities and input budget must be at least 1".to_string(),
            ));
        }
        if self.reconnect_initial_ms == 0 || self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(ConfigError::ValidationError(
                "reconnect_max_ms must be >= reconnect_initial_ms > 0".to_string(),
            ));
        }
        if !self.consent.bind_addr.ip().is_loopback() {
            return Err(ConfigError::ValidationError(format!(
                "consent.bind_addr must be a loopback address, got {}",
                self.consent.bind_addr
            )));
        }
        if matches!(&self.consent.token, Some(t) if t.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "consent.token must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> AgentConfig {
        AgentConfig {
            client_id: "lab-07".to_string(),
            display_name: "Lab 07".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_with_identity_is_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_default_bridge_dir_is_not_shared_temp() {
        let config = AgentConfig::default();
        assert!(!config.consent.bridge_dir.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_consent_must_bind_loopback() {
        let mut config = valid();
        config.consent.bind_addr = "0.0.0.0:47115".parse().unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
        config.consent.bind_addr = "[::1]:47115".parse().unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relay_url_scheme() {
        let mut config = valid();
        config.relay_url = "http://relay:8787".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_with_nested_consent_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
relay_url = "wss://relay.school.example"
client_id = "room-4-pc-2"
display_name = "Room 4 PC 2"

[consent]
bind_addr = "127.0.0.1:50000"
"#
        )
        .unwrap();
        let config = AgentConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.consent.bind_addr.port(), 50000);
        assert_eq!(config.tick_interval_ms, 250);
    }
}
