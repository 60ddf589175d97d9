//! Configuration module
//!
//! `AppConfig` mirrors the TOML file (`<config dir>/ocpp-central/config.toml`,
//! or the path in `OCPP_CONFIG`). Every section has defaults, so an empty file
//! is a valid configuration. `Config` is the runtime view the WebSocket server
//! consumes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "OCPP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

// ── Sections ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSection {
    #[validate(length(min = 1, message = "host must not be empty"))]
    pub host: String,
    pub port: u16,
    /// Seconds allowed for closing connections on shutdown
    #[validate(range(min = 1, max = 600))]
    pub shutdown_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CompatSection {
    /// Attribute connector-0 MeterValues to the single active connector
    pub reassign_connector_zero_meter_values: bool,
}

impl Default for CompatSection {
    fn default() -> Self {
        Self {
            reassign_connector_zero_meter_values: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OcppSection {
    /// Heartbeat interval handed out in BootNotification (seconds)
    #[validate(range(min = 1, max = 86400))]
    pub heartbeat_interval: i32,
    /// Timeout for outbound calls (seconds)
    #[validate(range(min = 1, max = 3600))]
    pub call_timeout_secs: u64,
    /// Tenant used for URLs without a tenant segment
    #[validate(length(min = 1, message = "default_tenant must not be empty"))]
    pub default_tenant: String,
    /// Idle time after which a connection is closed (seconds)
    #[validate(range(min = 1))]
    pub stale_connection_secs: u64,
    /// How often idle connections are looked for (seconds)
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,
    #[validate(nested)]
    pub compat: CompatSection,
}

impl Default for OcppSection {
    fn default() -> Self {
        Self {
            heartbeat_interval: 300,
            call_timeout_secs: 30,
            default_tenant: "default".to_string(),
            stale_connection_secs: 900,
            sweep_interval_secs: 60,
            compat: CompatSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AuthorizationSection {
    pub accepted_tags: Vec<String>,
    pub blocked_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PricingSection {
    #[validate(length(equal = 3, message = "currency must be an ISO 4217 code"))]
    pub currency: String,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSection {
    #[validate(length(min = 1))]
    pub level: String,
    /// Emit JSON lines instead of the human format
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsSection {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub listen: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:9100".to_string(),
        }
    }
}

/// Application configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerSection,
    #[validate(nested)]
    pub ocpp: OcppSection,
    /// Tenant subdomain → tenant id
    pub tenants: HashMap<String, String>,
    #[validate(nested)]
    pub authorization: AuthorizationSection,
    #[validate(nested)]
    pub pricing: PricingSection,
    #[validate(nested)]
    pub logging: LoggingSection,
    #[validate(nested)]
    pub metrics: MetricsSection,
}

impl AppConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// `$OCPP_CONFIG` if set, else `<config dir>/ocpp-central/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-central")
        .join("config.toml")
}

// ── Runtime view ───────────────────────────────────────────────

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Tenant for URLs without a tenant segment
    pub default_tenant: String,
    /// Outbound call timeout
    pub call_timeout: Duration,
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for Config {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            host: cfg.server.host.clone(),
            port: cfg.server.port,
            default_tenant: cfg.ocpp.default_tenant.clone(),
            call_timeout: Duration::from_secs(cfg.ocpp.call_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.ocpp.heartbeat_interval, 300);
        assert_eq!(cfg.ocpp.call_timeout_secs, 30);
        assert!(cfg.ocpp.compat.reassign_connector_zero_meter_values);
        assert!(cfg.tenants.is_empty());
    }

    #[test]
    fn sections_are_parsed() {
        let cfg = AppConfig::from_toml(
            r#"
            [server]
            port = 8180

            [ocpp]
            default_tenant = "main"
            call_timeout_secs = 10

            [ocpp.compat]
            reassign_connector_zero_meter_values = false

            [tenants]
            acme = "tenant-acme"

            [authorization]
            accepted_tags = ["GOOD"]

            [logging]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 8180);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert!(!cfg.ocpp.compat.reassign_connector_zero_meter_values);
        assert_eq!(cfg.tenants.get("acme").map(String::as_str), Some("tenant-acme"));
        assert_eq!(cfg.authorization.accepted_tags, vec!["GOOD".to_string()]);
        assert!(cfg.logging.json);

        let runtime = Config::from(&cfg);
        assert_eq!(runtime.address(), "0.0.0.0:8180");
        assert_eq!(runtime.default_tenant, "main");
        assert_eq!(runtime.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = AppConfig::from_toml("[ocpp]\nheartbeat_interval = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AppConfig::from_toml("[pricing]\ncurrency = \"euro\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = AppConfig::from_toml("[server\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
