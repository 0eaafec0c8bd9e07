use basalt_ring::{ProducerType, RingError, WaitStrategy};
use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Component-wide defaults, applied to every channel option a URI leaves out.
#[derive(Deserialize, Debug, Clone)]
pub struct ComponentConfig {
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "defaults::block_when_full")]
    pub block_when_full: bool,
    #[serde(default)]
    pub multiple_consumers: bool,
    #[serde(default = "defaults::concurrent_consumers")]
    pub concurrent_consumers: usize,
    #[serde(default, deserialize_with = "from_str_field")]
    pub producer_type: ProducerType,
    #[serde(default, deserialize_with = "from_str_field")]
    pub wait_strategy: WaitStrategy,
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Channel URIs the application should open at startup.
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Size(#[from] RingError),

    #[error("unsupported scheme '{scheme}' in '{uri}'")]
    UnknownScheme { scheme: String, uri: String },

    #[error("channel name is missing in '{uri}'")]
    EmptyName { uri: String },

    #[error("unknown channel option '{key}'")]
    UnknownOption { key: String },

    #[error("option '{key}' given more than once")]
    DuplicateOption { key: String },

    #[error("invalid value '{value}' for option '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("concurrentConsumers found to be 0, must be greater than 0")]
    ZeroConcurrentConsumers,
}

mod defaults {
    pub fn buffer_size() -> usize {
        1024
    }

    pub fn block_when_full() -> bool {
        true
    }

    pub fn concurrent_consumers() -> usize {
        1
    }

    pub fn timeout_ms() -> u64 {
        30_000
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

fn from_str_field<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            buffer_size: defaults::buffer_size(),
            block_when_full: defaults::block_when_full(),
            multiple_consumers: false,
            concurrent_consumers: defaults::concurrent_consumers(),
            producer_type: ProducerType::default(),
            wait_strategy: WaitStrategy::default(),
            timeout_ms: defaults::timeout_ms(),
            log_level: defaults::log_level(),
            channels: Vec::new(),
        }
    }
}

impl ComponentConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&toml_to_str)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ComponentConfig = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
