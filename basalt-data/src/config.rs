//! Configuration loading
//!
//! Layered figment sources: serialized defaults, then `basalt.toml`, then
//! `BASALT_`-prefixed environment variables (double underscore separates
//! nesting, e.g. `BASALT_DATABASE__URL`).

use std::collections::HashMap;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ConstraintTarget;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "basalt.toml";

/// Configuration could not be assembled or deserialized.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(Box<figment::Error>);

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Top-level library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Constraint registry entries: constraint name to (entity, field).
    #[serde(default)]
    pub constraints: HashMap<String, ConstraintTarget>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            constraints: HashMap::new(),
        }
    }
}

impl DataConfig {
    /// Load from defaults, `basalt.toml`, and `BASALT_` environment
    /// variables, in increasing precedence.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::figment().extract()?)
    }

    /// Load with an explicit configuration file path.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BASALT_").split("__"));
        Ok(figment.extract()?)
    }

    /// The figment used by [`DataConfig::load`], exposed so applications can
    /// layer their own providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("BASALT_").split("__"))
    }
}

/// Connection-pool settings for the Postgres backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait when acquiring a connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Connection attempts before giving up at startup.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between startup connection attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}
