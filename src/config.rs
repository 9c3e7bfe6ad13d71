use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::{Validate, ValidationError};

use crate::domain::{key_space_end, DEFAULT_MUTATIONS_PER_WRITE, DEFAULT_UID_BASE};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "LOADGEN__";

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub load: LoadConfig,
    #[validate(nested)]
    pub backend: BackendConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "info,hyper=warn,tower_http=info,sqlx=warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Shape of the generated load. Read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_key_space"))]
pub struct LoadConfig {
    /// Number of virtual clients.
    #[validate(range(min = 1))]
    pub client_count: usize,
    /// Total number of distinct keys across all clients.
    pub uid_count: u64,
    /// Every key is rewritten once per this many seconds.
    #[validate(range(min = 1))]
    pub write_interval_seconds: u64,
    /// Payload size in bytes.
    pub value_length: usize,
    pub uid_base: i64,
    pub mutations_per_write: usize,
    #[validate(range(min = 1))]
    pub report_interval_seconds: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            client_count: 10,
            uid_count: 100_000,
            write_interval_seconds: 10,
            value_length: 1024,
            uid_base: DEFAULT_UID_BASE,
            mutations_per_write: DEFAULT_MUTATIONS_PER_WRITE,
            report_interval_seconds: 5,
        }
    }
}

fn validate_key_space(cfg: &LoadConfig) -> Result<(), ValidationError> {
    match key_space_end(cfg.uid_base, cfg.uid_count) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("key_space_overflow")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub url: String,
    pub table: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Memory backend only: fixed delay per upsert.
    pub simulated_latency_ms: u64,
    /// Memory backend only: random extra delay per upsert.
    pub latency_jitter_ms: u64,
    /// Memory backend only: fraction of upserts that fail.
    #[validate(range(min = 0.0, max = 1.0))]
    pub failure_ratio: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            url: "postgres://localhost/loadgen".to_string(),
            table: "load_records".to_string(),
            max_connections: 32,
            acquire_timeout_secs: 30,
            simulated_latency_ms: 2,
            latency_jitter_ms: 3,
            failure_ratio: 0.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(DEFAULT_CONFIG_PATH))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract().context("failed to read configuration")?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::from_figment(Figment::from(Serialized::defaults(Config::default()))).unwrap();
        assert_eq!(cfg.load.report_interval_seconds, 5);
        assert_eq!(cfg.load.uid_base, DEFAULT_UID_BASE);
        assert_eq!(cfg.backend.kind, BackendKind::Memory);
    }

    #[test]
    fn test_toml_overrides() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [load]
            client_count = 2
            uid_count = 200
            write_interval_seconds = 10
            value_length = 16

            [backend]
            kind = "postgres"

            [log]
            format = "text"
            "#,
        ));
        let cfg = Config::from_figment(figment).unwrap();
        assert_eq!(cfg.load.client_count, 2);
        assert_eq!(cfg.load.uid_count, 200);
        assert_eq!(cfg.load.mutations_per_write, DEFAULT_MUTATIONS_PER_WRITE);
        assert_eq!(cfg.backend.kind, BackendKind::Postgres);
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.log.format, LogFormat::Text);
    }

    #[test]
    fn test_zero_clients_rejected() {
        let figment = Figment::new().merge(Toml::string("[load]\nclient_count = 0\n"));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_zero_write_interval_rejected() {
        let figment = Figment::new().merge(Toml::string("[load]\nwrite_interval_seconds = 0\n"));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_failure_ratio_out_of_range_rejected() {
        let figment = Figment::new().merge(Toml::string("[backend]\nfailure_ratio = 1.5\n"));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_key_space_overflow_rejected() {
        let figment = Figment::new().merge(Toml::string(
            "[load]\nuid_base = 9223372036854775000\nuid_count = 100000\n",
        ));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(format!("{err:#}").contains("key_space_overflow"));
    }

    #[test]
    fn test_key_space_at_top_of_range_accepted() {
        let figment = Figment::new().merge(Toml::string(
            "[load]\nuid_base = 9223372036854675807\nuid_count = 100000\n",
        ));
        let cfg = Config::from_figment(figment).unwrap();
        assert_eq!(cfg.load.uid_base + cfg.load.uid_count as i64, i64::MAX);
    }

    #[test]
    fn test_socket_addr() {
        let addr = ServerConfig::default().socket_addr().unwrap();
        assert_eq!(addr.port(), 5000);
    }

    #[test]
    fn test_backend_kind_parses() {
        assert_eq!("postgres".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }
}
