//! Daemon and client configuration.
//!
//! Both are read from TOML. Every section is optional; missing values take
//! their defaults. Rate limits that are missing, zero or negative fall back
//! to the built-in defaults and the substitution is recorded in
//! [`Config::fallbacks`] so the daemon can log it once logging is up.

use crate::application::permit::PermitLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default location of the daemon configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/brute_guard/config.toml";
/// Default location of the client configuration.
pub const DEFAULT_CLIENT_CONFIG_PATH: &str = "/etc/brute_guard/cli.toml";

pub const DEFAULT_LOGIN_PER_WINDOW: u64 = 10;
pub const DEFAULT_PASSWORD_PER_WINDOW: u64 = 100;
pub const DEFAULT_IP_PER_WINDOW: u64 = 1000;
pub const DEFAULT_BASE_WINDOW_MS: u64 = 60_000;

/// Error raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_service_id")]
    pub service_id: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Notices about limits replaced by their defaults.
    #[serde(skip)]
    pub fallbacks: Vec<String>,
}

/// Per-window limits and the base window length.
///
/// Signed so that negative values in the file are caught and replaced
/// instead of failing the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub login_per_window: i64,
    #[serde(default)]
    pub password_per_window: i64,
    #[serde(default)]
    pub ip_per_window: i64,
    #[serde(default)]
    pub base_window_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Pgsql,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type", default)]
    pub kind: StorageKind,
    #[serde(default)]
    pub dsn: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Management client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub server: ApiConfig,
}

fn default_service_id() -> String {
    "brute-guard".to_string()
}

fn default_service_name() -> String {
    "Brute-force protection".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_max_connections() -> u32 {
    10
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ApiConfig {
    /// `host:port` string for binding or connecting.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            dsn: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            service_id: default_service_id(),
            service_name: default_service_name(),
            limits: LimitsConfig::default(),
            logger: LoggerConfig::default(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            fallbacks: Vec::new(),
        };
        config.apply_fallbacks();
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logger: LoggerConfig::default(),
            server: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// `Parse` for malformed TOML or an unknown storage type, `Invalid` when
    /// the PostgreSQL backend is selected without a DSN.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(text)?;
        config.apply_fallbacks();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Limits for the permit checker.
    pub fn permit_limits(&self) -> PermitLimits {
        PermitLimits {
            login: positive(self.limits.login_per_window, DEFAULT_LOGIN_PER_WINDOW),
            password: positive(self.limits.password_per_window, DEFAULT_PASSWORD_PER_WINDOW),
            ip: positive(self.limits.ip_per_window, DEFAULT_IP_PER_WINDOW),
        }
    }

    pub fn base_window(&self) -> Duration {
        Duration::from_millis(positive(self.limits.base_window_ms, DEFAULT_BASE_WINDOW_MS))
    }

    fn apply_fallbacks(&mut self) {
        let limits = &mut self.limits;
        let fields: [(&str, &mut i64, u64); 4] = [
            (
                "limits.login_per_window",
                &mut limits.login_per_window,
                DEFAULT_LOGIN_PER_WINDOW,
            ),
            (
                "limits.password_per_window",
                &mut limits.password_per_window,
                DEFAULT_PASSWORD_PER_WINDOW,
            ),
            (
                "limits.ip_per_window",
                &mut limits.ip_per_window,
                DEFAULT_IP_PER_WINDOW,
            ),
            (
                "limits.base_window_ms",
                &mut limits.base_window_ms,
                DEFAULT_BASE_WINDOW_MS,
            ),
        ];

        for (name, value, default) in fields {
            if *value <= 0 {
                self.fallbacks.push(format!(
                    "{name} is {value}, using default {default}",
                    value = *value
                ));
                *value = default as i64;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.kind == StorageKind::Pgsql && self.storage.dsn.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.dsn is required for pgsql storage".to_string(),
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_connections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl ClientConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

fn positive(value: i64, default: u64) -> u64 {
    u64::try_from(value).ok().filter(|v| *v > 0).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
service_id = "guard-1"
service_name = "Guard"

[limits]
login_per_window = 5
password_per_window = 50
ip_per_window = 500
base_window_ms = 30000

[logger]
level = "debug"

[api]
host = "0.0.0.0"
port = 6000

[storage]
type = "pgsql"
dsn = "postgres://u:p@localhost:5432/db"
max_connections = 4
"#;

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(FULL).unwrap();
        assert_eq!(config.service_id, "guard-1");
        assert_eq!(
            config.permit_limits(),
            PermitLimits {
                login: 5,
                password: 50,
                ip: 500
            }
        );
        assert_eq!(config.base_window(), Duration::from_secs(30));
        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.api.address(), "0.0.0.0:6000");
        assert_eq!(config.storage.kind, StorageKind::Pgsql);
        assert_eq!(config.storage.max_connections, 4);
        assert!(config.fallbacks.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.permit_limits(), PermitLimits::default());
        assert_eq!(config.base_window(), Duration::from_secs(60));
        assert_eq!(config.api.address(), "127.0.0.1:50051");
        assert_eq!(config.storage.kind, StorageKind::Memory);
        assert_eq!(config.logger.level, "info");
        assert_eq!(config.fallbacks.len(), 4);
    }

    #[test]
    fn test_non_positive_limits_fall_back() {
        let config = Config::from_toml(
            "[limits]\nlogin_per_window = 0\npassword_per_window = -3\nip_per_window = 7\n",
        )
        .unwrap();
        let limits = config.permit_limits();
        assert_eq!(limits.login, 10);
        assert_eq!(limits.password, 100);
        assert_eq!(limits.ip, 7);
        assert_eq!(config.fallbacks.len(), 3);
        assert!(config
            .fallbacks
            .iter()
            .any(|n| n.contains("password_per_window is -3")));
    }

    #[test]
    fn test_unknown_storage_type() {
        let err = Config::from_toml("[storage]\ntype = \"redis\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_pgsql_requires_dsn() {
        let err = Config::from_toml("[storage]\ntype = \"pgsql\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.api.port, 6000);

        let missing = Config::load("/nonexistent/brute_guard.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_client_config() {
        let config =
            ClientConfig::from_toml("[server]\nhost = \"::1\"\nport = 7000\n").unwrap();
        assert_eq!(config.server.address(), "[::1]:7000");
        assert_eq!(config.logger.level, "info");

        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config.server.address(), "127.0.0.1:50051");
    }
}
