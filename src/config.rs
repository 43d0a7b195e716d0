//! Gateway configuration, loaded from a TOML file.
//!
//! Every field has a default so the binary runs with no config file at all.
//! The file path comes from the `OCPP_GATEWAY_CONFIG` environment variable,
//! falling back to `config.toml` in the working directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "OCPP_GATEWAY_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    /// Directory holding one JSON Schema per action, `<Action>.json`.
    pub schema_dir: Option<PathBuf>,
    /// Identities allowed to connect. Empty means every identity is admitted.
    pub allowed_charge_points: Vec<String>,
    /// Heartbeat interval handed to chargers in BootNotification replies.
    pub heartbeat_interval_secs: i64,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// HTTP endpoint of the external log collector. Absent disables auditing.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json".
    pub format: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            schema_dir: Some(PathBuf::from("schemas")),
            allowed_charge_points: Vec::new(),
            heartbeat_interval_secs: 300,
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from the path named by [`CONFIG_ENV_VAR`], or the default path.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// Bind address for the WebSocket listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Whether `identity` may establish a session.
    pub fn identity_allowed(&self, identity: &str) -> bool {
        self.allowed_charge_points.is_empty()
            || self.allowed_charge_points.iter().any(|id| id == identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = GatewayConfig::default();
        assert_eq!(config.address(), "0.0.0.0:9000");
        assert_eq!(config.heartbeat_interval_secs, 300);
        assert!(config.audit.endpoint.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_allowlist_admits_everyone() {
        let config = GatewayConfig::default();
        assert!(config.identity_allowed("CP001"));
        assert!(config.identity_allowed("anything"));
    }

    #[test]
    fn populated_allowlist_is_exact_match() {
        let config = GatewayConfig {
            allowed_charge_points: vec!["CP001".to_string(), "CP002".to_string()],
            ..Default::default()
        };
        assert!(config.identity_allowed("CP001"));
        assert!(!config.identity_allowed("cp001"));
        assert!(!config.identity_allowed("CP003"));
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let raw = r#"
            heartbeat_interval_secs = 60

            [server]
            port = 8887

            [audit]
            endpoint = "http://localhost:3000/logs"
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 8887);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.heartbeat_interval_secs, 60);
        assert_eq!(
            config.audit.endpoint.as_deref(),
            Some("http://localhost:3000/logs")
        );
    }
}
