//! Service configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags and environment variables (MQTT_BROKER, MQTT_PORT,
//!    MQTT_INPUT_TOPIC_BASE, MQTT_OUTPUT_TOPIC_BASE, MQTT_TOPIC_ID,
//!    MAX_RETRIES, RETRY_DELAY, LOG_LEVEL)
//! 2. Optional YAML config file
//! 3. Defaults
//!
//! The resolved [`Config`] is built once at startup and passed explicitly
//! to the components that need it.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BROKER: &str = "test.mosquitto.org";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_INPUT_TOPIC_BASE: &str = "BRE/calculateWinterSupplementInput/";
pub const DEFAULT_OUTPUT_TOPIC_BASE: &str = "BRE/calculateWinterSupplementOutput/";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 3;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// One layer of partially specified settings.
///
/// Used both for flags/environment (via clap) and for the YAML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", global = true)]
    pub broker: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", global = true)]
    pub port: Option<u16>,

    /// Prefix of input topics; the correlation id is appended
    #[arg(long, env = "MQTT_INPUT_TOPIC_BASE", global = true)]
    pub input_topic_base: Option<String>,

    /// Prefix of output topics; the correlation id is appended
    #[arg(long, env = "MQTT_OUTPUT_TOPIC_BASE", global = true)]
    pub output_topic_base: Option<String>,

    /// Only handle this correlation id (subscribes to every id if unset)
    #[arg(long, env = "MQTT_TOPIC_ID", global = true)]
    pub topic_id: Option<String>,

    /// Maximum number of connection attempts
    #[arg(long, env = "MAX_RETRIES", global = true)]
    pub max_retries: Option<u32>,

    /// Delay between connection attempts, in seconds
    #[arg(long, env = "RETRY_DELAY", global = true)]
    pub retry_delay: Option<u64>,

    /// Log level (e.g. DEBUG, INFO, WARN)
    #[arg(long, env = "LOG_LEVEL", global = true)]
    pub log_level: Option<String>,
}

impl ConfigLayer {
    /// Fill unset values from a lower-priority layer
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            broker: self.broker.or(lower.broker),
            port: self.port.or(lower.port),
            input_topic_base: self.input_topic_base.or(lower.input_topic_base),
            output_topic_base: self.output_topic_base.or(lower.output_topic_base),
            topic_id: self.topic_id.or(lower.topic_id),
            max_retries: self.max_retries.or(lower.max_retries),
            retry_delay: self.retry_delay.or(lower.retry_delay),
            log_level: self.log_level.or(lower.log_level),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub broker: String,
    pub port: u16,
    pub input_topic_base: String,
    pub output_topic_base: String,
    /// Specific correlation id for exclusive subscription
    pub topic_id: Option<String>,
    pub max_retries: u32,
    #[serde(rename = "retry_delay_seconds", serialize_with = "serialize_seconds")]
    pub retry_delay: Duration,
    pub log_level: String,
}

fn serialize_seconds<S: serde::Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(delay.as_secs())
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(ConfigLayer::default())
    }
}

impl Config {
    /// Apply defaults to a merged layer
    pub fn resolve(layer: ConfigLayer) -> Self {
        Self {
            broker: layer.broker.unwrap_or_else(|| DEFAULT_BROKER.to_string()),
            port: layer.port.unwrap_or(DEFAULT_PORT),
            input_topic_base: layer
                .input_topic_base
                .unwrap_or_else(|| DEFAULT_INPUT_TOPIC_BASE.to_string()),
            output_topic_base: layer
                .output_topic_base
                .unwrap_or_else(|| DEFAULT_OUTPUT_TOPIC_BASE.to_string()),
            // An empty id means broadcast mode
            topic_id: layer.topic_id.filter(|id| !id.is_empty()),
            max_retries: layer.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_secs(
                layer.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECONDS),
            ),
            log_level: layer
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    /// Load configuration from flags/environment and an optional config file
    pub fn load(overrides: ConfigLayer, config_file: Option<&Path>) -> Result<Self> {
        let layer = match config_file {
            Some(path) => overrides.or(load_config_file(path)?),
            None => overrides,
        };
        Ok(Self::resolve(layer))
    }

    /// Input topic for a correlation id
    pub fn input_topic(&self, correlation_id: &str) -> String {
        format!("{}{}", self.input_topic_base, correlation_id)
    }

    /// Output topic for a correlation id
    pub fn output_topic(&self, correlation_id: &str) -> String {
        format!("{}{}", self.output_topic_base, correlation_id)
    }

    /// Topic filter to subscribe to: the configured id only, or every id
    pub fn subscription_filter(&self) -> String {
        match &self.topic_id {
            Some(id) => self.input_topic(id),
            None => self.input_topic("+"),
        }
    }
}

/// Load and parse a YAML config file
pub fn load_config_file(path: &Path) -> Result<ConfigLayer> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    // An empty document means "nothing overridden"
    if content.trim().is_empty() {
        return Ok(ConfigLayer::default());
    }

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
