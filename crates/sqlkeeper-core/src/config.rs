//! Retry policy and the `connection_keeper` parameter section.
//!
//! A [`RetryPolicy`] is built once, either through its builder methods or by
//! parsing the `connection_keeper` section of a connection parameter document
//! with [`KeeperParams`], and is then owned by the component it configures.

use crate::error::{ConfigError, Error, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Name of the parameter section read by [`KeeperParams::from_connection_params`].
pub const PARAMS_SECTION: &str = "connection_keeper";

/// How a connection or a unit of work reacts to failures.
///
/// Immutable once built: builder methods consume and return the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    reconnect_attempts: u32,
    refresh_on_exception: bool,
    handle_retryable_exceptions: bool,
    retry_sleep: Duration,
    connection_loss_phrases: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reconnect_attempts: 0,
            refresh_on_exception: false,
            handle_retryable_exceptions: false,
            retry_sleep: Duration::ZERO,
            connection_loss_phrases: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy allowing `reconnect_attempts` retries after the first attempt.
    pub fn new(reconnect_attempts: u32) -> Self {
        Self {
            reconnect_attempts,
            ..Default::default()
        }
    }

    /// Policy for the transactional decorator: one retry, conflicts honored,
    /// a short pause before the replay.
    pub fn transactional() -> Self {
        Self {
            reconnect_attempts: 1,
            handle_retryable_exceptions: true,
            retry_sleep: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Set the number of retries.
    pub fn reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Probe the fresh connection with a trivial query after reconnecting.
    pub fn refresh_on_exception(mut self, enabled: bool) -> Self {
        self.refresh_on_exception = enabled;
        self
    }

    /// Also retry deadlocks, serialization failures and lock timeouts.
    pub fn handle_retryable_exceptions(mut self, enabled: bool) -> Self {
        self.handle_retryable_exceptions = enabled;
        self
    }

    /// Pause between transactional attempts.
    pub fn retry_sleep(mut self, sleep: Duration) -> Self {
        self.retry_sleep = sleep;
        self
    }

    /// Add a vendor phrase that identifies a lost connection.
    pub fn connection_loss_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.connection_loss_phrases.push(phrase.into());
        self
    }

    pub fn attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn refreshes_on_exception(&self) -> bool {
        self.refresh_on_exception
    }

    pub fn handles_retryable_exceptions(&self) -> bool {
        self.handle_retryable_exceptions
    }

    pub fn sleep(&self) -> Duration {
        self.retry_sleep
    }

    /// Extra connection-loss phrases on top of the built-in vocabulary.
    pub fn extra_connection_loss_phrases(&self) -> &[String] {
        &self.connection_loss_phrases
    }

    /// Whether any retry is possible at all.
    pub fn retries_enabled(&self) -> bool {
        self.reconnect_attempts > 0
    }
}

/// Raw `connection_keeper` parameters as found in configuration.
///
/// Values are accepted leniently: booleans may be given as `true`, `1`,
/// `"yes"`, `"on"`, `"true"` (and their negative counterparts), integers as
/// numbers or numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeeperParams {
    #[serde(deserialize_with = "lenient_int")]
    pub reconnect_attempts: i64,
    #[serde(deserialize_with = "lenient_bool")]
    pub refresh_on_exception: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub handle_retryable_exceptions: bool,
    #[serde(deserialize_with = "lenient_int")]
    pub retry_sleep_ms: i64,
    pub connection_loss_phrases: Vec<String>,
}

impl KeeperParams {
    /// Parse a bare `connection_keeper` section.
    pub fn from_value(section: serde_json::Value) -> Result<Self> {
        serde_json::from_value(section).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid {PARAMS_SECTION} parameters: {e}"),
                source: Some(Box::new(e)),
            })
        })
    }

    /// Parse the `connection_keeper` section of a full connection parameter
    /// document. A missing section yields the defaults.
    pub fn from_connection_params(params: &serde_json::Value) -> Result<Self> {
        match params.get(PARAMS_SECTION) {
            Some(section) => Self::from_value(section.clone()),
            None => Ok(Self::default()),
        }
    }

    /// Parse a JSON document holding connection parameters.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("connection parameters are not valid JSON: {e}"),
                source: Some(Box::new(e)),
            })
        })?;
        Self::from_connection_params(&params)
    }

    /// Validate and convert into a [`RetryPolicy`].
    pub fn into_policy(self) -> Result<RetryPolicy> {
        let reconnect_attempts = u32::try_from(self.reconnect_attempts).map_err(|_| {
            Error::config(format!(
                "reconnect_attempts must be between 0 and {}, got {}",
                u32::MAX,
                self.reconnect_attempts
            ))
        })?;
        let retry_sleep_ms = u64::try_from(self.retry_sleep_ms).map_err(|_| {
            Error::config(format!(
                "retry_sleep_ms must not be negative, got {}",
                self.retry_sleep_ms
            ))
        })?;

        Ok(RetryPolicy {
            reconnect_attempts,
            refresh_on_exception: self.refresh_on_exception,
            handle_retryable_exceptions: self.handle_retryable_exceptions,
            retry_sleep: Duration::from_millis(retry_sleep_ms),
            connection_loss_phrases: self.connection_loss_phrases,
        })
    }
}

impl TryFrom<KeeperParams> for RetryPolicy {
    type Error = Error;

    fn try_from(params: KeeperParams) -> Result<Self> {
        params.into_policy()
    }
}

impl RetryPolicy {
    /// Build a policy from the `connection_keeper` section of connection parameters.
    pub fn from_connection_params(params: &serde_json::Value) -> Result<Self> {
        KeeperParams::from_connection_params(params)?.into_policy()
    }
}

fn parse_bool(raw: &serde_json::Value) -> Option<bool> {
    match raw {
        serde_json::Value::Null => Some(false),
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_int(raw: &serde_json::Value) -> Option<i64> {
    match raw {
        serde_json::Value::Null => Some(0),
        serde_json::Value::Bool(b) => Some(i64::from(*b)),
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_number)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// Floats are accepted only when they hold an exact integer in range.
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
fn whole_number(f: f64) -> Option<i64> {
    if f.fract() != 0.0 || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return None;
    }
    Some(f as i64)
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    parse_bool(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a boolean flag, got {raw}")))
}

fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    parse_int(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {raw}")))
}
