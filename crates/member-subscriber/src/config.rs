//! Member subscriber configuration.
//!
//! Configuration is loaded from environment variables.

use crate::subscription::ModeFallback;
use crate::transport::MediaMode;

use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default subscribe mode for remote members.
pub const DEFAULT_PREFERRED_MODE: MediaMode = MediaMode::Video;

/// Default member actor mailbox capacity.
pub const DEFAULT_MEMBER_MAILBOX_CAPACITY: usize = 64;

/// Default room actor mailbox capacity.
pub const DEFAULT_ROOM_MAILBOX_CAPACITY: usize = 256;

/// Default time the replay harness waits for members to settle.
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 5000;

/// Member subscriber configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Mode requested for remote members (default: video).
    pub preferred_mode: MediaMode,

    /// Behaviour when a video request for a candidate fails.
    pub mode_fallback: ModeFallback,

    /// Member actor mailbox capacity.
    pub member_mailbox_capacity: usize,

    /// Room actor mailbox capacity.
    pub room_mailbox_capacity: usize,

    /// How long the replay harness waits for pending requests to settle.
    pub settle_timeout: Duration,

    /// Scenario file replayed by the binary.
    pub scenario_path: Option<String>,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_mode: DEFAULT_PREFERRED_MODE,
            mode_fallback: ModeFallback::default(),
            member_mailbox_capacity: DEFAULT_MEMBER_MAILBOX_CAPACITY,
            room_mailbox_capacity: DEFAULT_ROOM_MAILBOX_CAPACITY,
            settle_timeout: Duration::from_millis(DEFAULT_SETTLE_TIMEOUT_MS),
            scenario_path: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("preferred_mode", &self.preferred_mode.as_str())
            .field("mode_fallback", &self.mode_fallback)
            .field("member_mailbox_capacity", &self.member_mailbox_capacity)
            .field("room_mailbox_capacity", &self.room_mailbox_capacity)
            .field("settle_timeout_ms", &self.settle_timeout.as_millis())
            .field("scenario_path", &self.scenario_path)
            .field("log_level", &self.observability.log_level)
            .field("json_logs", &self.observability.json_logs)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let preferred_mode = match vars.get("MS_PREFERRED_MODE") {
            Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
                name: "MS_PREFERRED_MODE".to_string(),
                reason,
            })?,
            None => DEFAULT_PREFERRED_MODE,
        };

        let mode_fallback = if parse_bool(vars, "MS_AUDIO_FALLBACK")? {
            ModeFallback::AudioThenNext
        } else {
            ModeFallback::NextCandidate
        };

        let member_mailbox_capacity = parse_capacity(
            vars,
            "MS_MEMBER_MAILBOX_CAPACITY",
            DEFAULT_MEMBER_MAILBOX_CAPACITY,
        )?;

        let room_mailbox_capacity =
            parse_capacity(vars, "MS_ROOM_MAILBOX_CAPACITY", DEFAULT_ROOM_MAILBOX_CAPACITY)?;

        let settle_timeout_ms = match vars.get("MS_SETTLE_TIMEOUT_MS") {
            Some(value) => value.parse().map_err(|e| ConfigError::InvalidValue {
                name: "MS_SETTLE_TIMEOUT_MS".to_string(),
                reason: format!("{e}"),
            })?,
            None => DEFAULT_SETTLE_TIMEOUT_MS,
        };

        let scenario_path = vars
            .get("MS_SCENARIO_PATH")
            .filter(|path| !path.trim().is_empty())
            .cloned();

        let observability = ObservabilityConfig {
            log_level: vars
                .get("MS_LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            json_logs: parse_bool(vars, "MS_LOG_JSON")?,
        };

        Ok(Config {
            preferred_mode,
            mode_fallback,
            member_mailbox_capacity,
            room_mailbox_capacity,
            settle_timeout: Duration::from_millis(settle_timeout_ms),
            scenario_path,
            observability,
        })
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
    }
}

fn parse_capacity(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(value) = vars.get(name) else {
        return Ok(default);
    };

    match value.parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "capacity must be greater than zero".to_string(),
        }),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("{e}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load");

        assert_eq!(config, Config::default());
        assert_eq!(config.preferred_mode, MediaMode::Video);
        assert_eq!(config.mode_fallback, ModeFallback::NextCandidate);
        assert_eq!(config.member_mailbox_capacity, DEFAULT_MEMBER_MAILBOX_CAPACITY);
        assert_eq!(config.room_mailbox_capacity, DEFAULT_ROOM_MAILBOX_CAPACITY);
        assert_eq!(config.settle_timeout, Duration::from_secs(5));
        assert!(config.scenario_path.is_none());
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("MS_PREFERRED_MODE".to_string(), "audio".to_string()),
            ("MS_AUDIO_FALLBACK".to_string(), "true".to_string()),
            ("MS_MEMBER_MAILBOX_CAPACITY".to_string(), "8".to_string()),
            ("MS_ROOM_MAILBOX_CAPACITY".to_string(), "32".to_string()),
            ("MS_SETTLE_TIMEOUT_MS".to_string(), "250".to_string()),
            ("MS_SCENARIO_PATH".to_string(), "/tmp/room.json".to_string()),
            ("MS_LOG_LEVEL".to_string(), "debug".to_string()),
            ("MS_LOG_JSON".to_string(), "1".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load");

        assert_eq!(config.preferred_mode, MediaMode::Audio);
        assert_eq!(config.mode_fallback, ModeFallback::AudioThenNext);
        assert_eq!(config.member_mailbox_capacity, 8);
        assert_eq!(config.room_mailbox_capacity, 32);
        assert_eq!(config.settle_timeout, Duration::from_millis(250));
        assert_eq!(config.scenario_path.as_deref(), Some("/tmp/room.json"));
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let vars = HashMap::from([("MS_PREFERRED_MODE".to_string(), "screen".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "MS_PREFERRED_MODE")
        );
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let vars = HashMap::from([("MS_AUDIO_FALLBACK".to_string(), "maybe".to_string())]);
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let vars = HashMap::from([("MS_MEMBER_MAILBOX_CAPACITY".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "MS_MEMBER_MAILBOX_CAPACITY")
        );
    }

    #[test]
    fn test_blank_scenario_path_ignored() {
        let vars = HashMap::from([("MS_SCENARIO_PATH".to_string(), "  ".to_string())]);
        let config = Config::from_vars(&vars).unwrap();
        assert!(config.scenario_path.is_none());
    }

    #[test]
    fn test_debug_output() {
        let debug_output = format!("{:?}", Config::default());
        assert!(debug_output.contains("preferred_mode: \"video\""));
        assert!(debug_output.contains("settle_timeout_ms: 5000"));
    }
}
