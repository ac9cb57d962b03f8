//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rayo_core::{RayoError, RayoResult, Topic, RAYO_TOPIC};

use crate::{init_tracing, LogFormat};

/// Rayo session configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pubsub topic
    pub topic: String,
    /// Period between heartbeat messages
    #[serde(with = "humantime_duration")]
    pub heartbeat_interval: Duration,
    /// Heartbeat text, `None` disables the heartbeat
    pub heartbeat_text: Option<String>,
    /// Handle the local peer is seeded with
    pub local_handle: String,
    /// Forward our own successful publishes to the message handler
    pub echo_local: bool,
    /// Capacity of the command queue in front of the driver
    pub command_buffer: usize,
    /// Output format used by [`SessionConfig::init_tracing`]
    pub log_format: LogFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            topic: RAYO_TOPIC.to_string(),
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_text: Some("Checking in".to_string()),
            local_handle: "Me".to_string(),
            echo_local: true,
            command_buffer: 64,
            log_format: LogFormat::Pretty,
        }
    }
}

impl SessionConfig {
    pub fn topic(&self) -> Topic {
        Topic::new(self.topic.as_str())
    }

    /// Parse and validate a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> RayoResult<Self> {
        let config: SessionConfig = serde_json::from_str(json).map_err(|e| RayoError::Config {
            key: "json".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `RAYO_*` environment variables
    pub fn from_env() -> RayoResult<Self> {
        let mut config = SessionConfig::default();

        if let Some(topic) = optional_env("RAYO_TOPIC")? {
            config.topic = topic;
        }
        if let Some(interval) = optional_env("RAYO_HEARTBEAT_INTERVAL")? {
            config.heartbeat_interval =
                humantime::parse_duration(&interval).map_err(|e| RayoError::Config {
                    key: "RAYO_HEARTBEAT_INTERVAL".to_string(),
                    message: format!("must be a duration such as '1s' or '500ms': {e}"),
                })?;
        }
        if let Some(text) = optional_env("RAYO_HEARTBEAT_TEXT")? {
            config.heartbeat_text = if text.is_empty() { None } else { Some(text) };
        }
        if let Some(handle) = optional_env("RAYO_LOCAL_HANDLE")? {
            config.local_handle = handle;
        }
        if let Some(echo) = optional_env("RAYO_ECHO_LOCAL")? {
            config.echo_local = echo.parse().map_err(|e| RayoError::Config {
                key: "RAYO_ECHO_LOCAL".to_string(),
                message: format!("must be 'true' or 'false': {e}"),
            })?;
        }
        if let Some(format) = optional_env("RAYO_LOG_FORMAT")? {
            config.log_format = format.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Install the global tracing subscriber in `log_format`
    pub fn init_tracing(&self) -> RayoResult<()> {
        init_tracing(self.log_format)
    }

    pub fn validate(&self) -> RayoResult<()> {
        if self.topic.is_empty() {
            return Err(invalid("topic", "must not be empty"));
        }
        if self.local_handle.is_empty() {
            return Err(invalid("local_handle", "must not be empty"));
        }
        if self.heartbeat_text.is_some() && self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_interval", "must be positive when heartbeat is enabled"));
        }
        if self.command_buffer == 0 {
            return Err(invalid("command_buffer", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> RayoError {
    RayoError::Config {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn optional_env(key: &str) -> RayoResult<Option<String>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(RayoError::Config {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
