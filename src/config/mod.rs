use crate::utils::error::{RdsPoolError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection parameters for the database principal.
///
/// Every field is required. Aliases accept the camelCase document stored in
/// the parameter store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    #[serde(alias = "maxPoolSize")]
    pub max_pool_size: usize,
    #[serde(alias = "minIdle")]
    pub min_idle: usize,
    #[serde(alias = "sslMode")]
    pub ssl_mode: TlsMode,
}

/// TLS negotiation mode, fixed for every physical connection of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Upper bound on how long `acquire` waits for a connection (milliseconds)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Upper bound on token generation plus connect (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Close connections idle for longer than this (seconds)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Close connections older than this regardless of use (seconds)
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    /// How often the background task evicts and refills (seconds)
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

// Default values
fn default_acquire_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_max_lifetime_secs() -> u64 {
    1800
}

fn default_maintenance_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: default_acquire_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RdsPoolError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| RdsPoolError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Decode the JSON document kept in the parameter store
    pub fn from_json(document: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(document)
            .map_err(|e| RdsPoolError::Config(format!("Failed to parse config document: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        let db = &self.db;

        for (field, value) in [
            ("host", &db.host),
            ("name", &db.name),
            ("username", &db.username),
        ] {
            if value.trim().is_empty() {
                return Err(RdsPoolError::Config(format!("db.{} cannot be empty", field)));
            }
        }

        if db.port == 0 {
            return Err(RdsPoolError::Config("db.port must be non-zero".to_string()));
        }

        if db.max_pool_size == 0 {
            return Err(RdsPoolError::Config(
                "db.max_pool_size must be at least 1".to_string(),
            ));
        }

        if db.min_idle > db.max_pool_size {
            return Err(RdsPoolError::Config(format!(
                "db.min_idle ({}) cannot exceed db.max_pool_size ({})",
                db.min_idle, db.max_pool_size
            )));
        }

        if self.pool.acquire_timeout_ms == 0 {
            return Err(RdsPoolError::Config(
                "pool.acquire_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(RdsPoolError::Config(format!(
                "Invalid log format: {}. Must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[db]
host = "my-cluster.cluster-abc123.eu-west-1.rds.amazonaws.com"
port = 5432
name = "app"
username = "app_iam_user"
max_pool_size = 10
min_idle = 1
ssl_mode = "require"  # Options: "disable", "allow", "prefer", "require", "verify-ca", "verify-full"

[pool]
acquire_timeout_ms = 30000
connect_timeout_ms = 10000
idle_timeout_secs = 600
max_lifetime_secs = 1800
maintenance_interval_secs = 30

[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "json"  # Options: "json", "pretty"
"#;

        std::fs::write(path.as_ref(), example).map_err(|e| {
            RdsPoolError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}

/// Where the environment's configuration document comes from.
pub trait ConfigSource {
    fn load(&self, key: &str) -> Result<Config>;
}

/// TOML file on disk. The key is ignored.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl ConfigSource for FileSource {
    fn load(&self, _key: &str) -> Result<Config> {
        Config::from_file(&self.path)
    }
}

/// JSON document held in the environment variable named by the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn load(&self, key: &str) -> Result<Config> {
        let document = std::env::var(key).map_err(|e| {
            RdsPoolError::Config(format!("Failed to read config parameter {}: {}", key, e))
        })?;
        Config::from_json(&document)
    }
}
