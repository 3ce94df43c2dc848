//! Application configuration.
//!
//! Sources, later overriding earlier:
//! 1. Built-in defaults
//! 2. `config.yaml` in the current directory (if it exists)
//! 3. File given by `--config` or `QUEUE_PURGE_CONFIG`
//! 4. `QUEUE_PURGE__*` environment variables (e.g. `QUEUE_PURGE__AMQP__QUEUE`)
//! 5. Command-line flags
//! 6. `AMQP_CONNECTION_STRING`, `AMQP_QUEUE_NAME`, `AMQP_JSON_PATH` when non-empty

mod cli;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::broker::AmqpConfig;
use crate::purge::{FieldExtractor, ScanSettings, DEFAULT_IDLE_TIMEOUT, DEFAULT_JSONPATH};
use crate::readiness::{DEFAULT_RETRY_INTERVAL, DEFAULT_STARTUP_TIMEOUT};

pub use cli::Cli;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "QUEUE_PURGE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "QUEUE_PURGE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "QUEUE_PURGE_LOG";
/// Environment variable selecting the log output format (`json` or `text`).
pub const LOG_FORMAT_ENV_VAR: &str = "QUEUE_PURGE_LOG_FORMAT";

/// Environment override for the AMQP connection string.
pub const AMQP_CONNECTION_STRING_ENV_VAR: &str = "AMQP_CONNECTION_STRING";
/// Environment override for the queue name.
pub const AMQP_QUEUE_NAME_ENV_VAR: &str = "AMQP_QUEUE_NAME";
/// Environment override for the JSON path.
pub const AMQP_JSON_PATH_ENV_VAR: &str = "AMQP_JSON_PATH";

/// Default webhook port.
pub const DEFAULT_PORT: u16 = 8090;

/// Configuration errors. All of them stop startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("bad hostname provided: {0}. {1}")]
    InvalidUrl(String, String),

    #[error("Invalid JSON path '{0}': {1}")]
    InvalidJsonPath(String, String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Webhook server configuration.
    pub server: ServerConfig,
    /// Broker connection and queue.
    pub amqp: AmqpConfig,
    /// Scan behaviour.
    pub scan: ScanConfig,
    /// Startup readiness gate.
    pub startup: StartupConfig,
}

/// Webhook server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Scan configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// JSON path of the field compared against purge ids.
    pub jsonpath: String,
    /// Longest idle wait between deliveries.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            jsonpath: DEFAULT_JSONPATH.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Startup readiness configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Overall deadline for the broker to become reachable.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Delay between connection attempts.
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STARTUP_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl Config {
    /// Load configuration from files and `QUEUE_PURGE__*` environment
    /// variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::from(config_path).format(FileFormat::Yaml));
        } else if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load, then apply flags and the legacy environment overrides.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = Self::load(cli.config.as_deref())?;
        config.apply_cli(cli);
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply command-line flags that were given.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(timeout) = cli.timeout {
            self.startup.timeout = timeout;
        }
        if let Some(interval) = cli.wait_retry_interval {
            self.startup.retry_interval = interval;
        }
        if let Some(url) = &cli.connection_string {
            self.amqp.url = url.clone();
        }
        if let Some(queue) = &cli.queue_name {
            self.amqp.queue = queue.clone();
        }
        if let Some(path) = &cli.jsonpath {
            self.scan.jsonpath = path.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
    }

    /// Apply `AMQP_*` overrides. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = non_empty(AMQP_CONNECTION_STRING_ENV_VAR) {
            self.amqp.url = url;
        }
        if let Some(queue) = non_empty(AMQP_QUEUE_NAME_ENV_VAR) {
            self.amqp.queue = queue;
        }
        if let Some(path) = non_empty(AMQP_JSON_PATH_ENV_VAR) {
            self.scan.jsonpath = path;
        }
    }

    /// Compile the scan settings. Fails on an invalid JSON path.
    pub fn scan_settings(&self) -> Result<ScanSettings, ConfigError> {
        Ok(ScanSettings {
            queue: self.amqp.queue.clone(),
            extractor: FieldExtractor::parse(&self.scan.jsonpath)?,
            idle_timeout: self.scan.idle_timeout,
        })
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests;
