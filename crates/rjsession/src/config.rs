//! Session configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::CodecLimits;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bytes of console output buffered before a forced flush.
    pub stdout_buffer_size: usize,
    /// How often idle plugins run while the engine waits for a client.
    pub idle_interval: Duration,
    pub limits: CodecLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stdout_buffer_size: 8192,
            idle_interval: Duration::from_millis(50),
            limits: CodecLimits::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `RJ_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |key: &str, default: usize| read_var(&lookup, key, default);

        config.stdout_buffer_size = var("RJ_STDOUT_BUFFER", config.stdout_buffer_size);
        config.idle_interval = Duration::from_millis(
            var("RJ_IDLE_INTERVAL_MS", config.idle_interval.as_millis() as usize) as u64,
        );
        config.limits.max_depth = var("RJ_MAX_DEPTH", config.limits.max_depth);
        config.limits.max_list_length = var("RJ_MAX_LIST_LENGTH", config.limits.max_list_length);
        config.limits.max_env_length = var("RJ_MAX_ENV_LENGTH", config.limits.max_env_length);
        config
    }

    pub fn with_stdout_buffer_size(mut self, size: usize) -> Self {
        self.stdout_buffer_size = size;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }
}

fn read_var<T: FromStr + Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Invalid config value, using default={}", default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> SessionConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SessionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn env_overrides() {
        let config = from_map(&[("RJ_STDOUT_BUFFER", "64"), ("RJ_MAX_DEPTH", " 8 ")]);
        assert_eq!(config.stdout_buffer_size, 64);
        assert_eq!(config.limits.max_depth, 8);
        assert_eq!(config.limits.max_list_length, 10_000);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = from_map(&[("RJ_IDLE_INTERVAL_MS", "soon"), ("RJ_MAX_ENV_LENGTH", "-1")]);
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn builder() {
        let config = SessionConfig::new()
            .with_stdout_buffer_size(16)
            .with_idle_interval(Duration::from_millis(5));
        assert_eq!(config.stdout_buffer_size, 16);
        assert_eq!(config.idle_interval, Duration::from_millis(5));
    }

    #[test]
    fn config_snapshot() {
        insta::assert_json_snapshot!(SessionConfig::default(), @r###"
        {
          "stdout_buffer_size": 8192,
          "idle_interval": {
            "secs": 0,
            "nanos": 50000000
          },
          "limits": {
            "max_depth": 128,
            "max_list_length": 10000,
            "max_env_length": 10000
          }
        }
        "###);
    }
}
