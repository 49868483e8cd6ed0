//! Relay configuration parsed from environment variables.
//!
//! Provider credentials live in `llm::config` and `tts::config`; this module
//! covers only the relay itself: bind address, framing, concurrency bound,
//! per-call timeouts, retry policy, and size limits.

use std::time::Duration;

use crate::frame::{CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_BYTES, Framing};
use crate::services::relay::RetryPolicy;

pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_CLIENT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;
pub const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SPEECH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BASE_MS: u64 = 250;
pub const DEFAULT_RETRY_MAX_MS: u64 = 4000;
pub const DEFAULT_MAX_REQUEST_BYTES: usize = CHUNK_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: '{value}' ({reason})")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
    /// Upper bound on concurrently processed requests across all connections.
    pub max_in_flight: usize,
    pub answer_timeout: Duration,
    pub speech_timeout: Duration,
    pub retry: RetryPolicy,
    pub max_request_bytes: usize,
    pub max_payload_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_PORT,
            framing: Framing::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            answer_timeout: Duration::from_secs(DEFAULT_ANSWER_TIMEOUT_SECS),
            speech_timeout: Duration::from_secs(DEFAULT_SPEECH_TIMEOUT_SECS),
            retry: RetryPolicy {
                max_retries: DEFAULT_MAX_RETRIES,
                base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
                max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
            },
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl RelayConfig {
    /// Build relay config from environment variables.
    ///
    /// - `RELAY_HOST` (default `0.0.0.0`), `RELAY_PORT` (default 8888)
    /// - `RELAY_FRAMING`: `sentinel` (default) or `length`
    /// - `RELAY_MAX_IN_FLIGHT`: default 16, must be at least 1
    /// - `RELAY_ANSWER_TIMEOUT_SECS`, `RELAY_SPEECH_TIMEOUT_SECS`: default 60
    /// - `RELAY_MAX_RETRIES` (2), `RELAY_RETRY_BASE_MS` (250), `RELAY_RETRY_MAX_MS` (4000)
    /// - `RELAY_MAX_REQUEST_BYTES` (1 MiB), `RELAY_MAX_PAYLOAD_BYTES` (64 MiB)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for any unparsable or out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build relay config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let framing = match var("RELAY_FRAMING") {
            Some(raw) => raw
                .parse::<Framing>()
                .map_err(|reason| ConfigError::Invalid { key: "RELAY_FRAMING", value: raw.clone(), reason })?,
            None => defaults.framing,
        };

        let max_in_flight: usize = parse_or(&var, "RELAY_MAX_IN_FLIGHT", defaults.max_in_flight)?;
        if max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                key: "RELAY_MAX_IN_FLIGHT",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            host: var("RELAY_HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "RELAY_PORT", defaults.port)?,
            framing,
            max_in_flight,
            answer_timeout: Duration::from_secs(parse_or(
                &var,
                "RELAY_ANSWER_TIMEOUT_SECS",
                DEFAULT_ANSWER_TIMEOUT_SECS,
            )?),
            speech_timeout: Duration::from_secs(parse_or(
                &var,
                "RELAY_SPEECH_TIMEOUT_SECS",
                DEFAULT_SPEECH_TIMEOUT_SECS,
            )?),
            retry: RetryPolicy {
                max_retries: parse_or(&var, "RELAY_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                base_delay: Duration::from_millis(parse_or(&var, "RELAY_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)?),
                max_delay: Duration::from_millis(parse_or(&var, "RELAY_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS)?),
            },
            max_request_bytes: parse_or(&var, "RELAY_MAX_REQUEST_BYTES", defaults.max_request_bytes)?,
            max_payload_bytes: parse_or(&var, "RELAY_MAX_PAYLOAD_BYTES", defaults.max_payload_bytes)?,
        })
    }

    /// `host:port` suitable for `TcpListener::bind` / `TcpStream::connect`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::Invalid { key, value: raw.clone(), reason: e.to_string() }),
        None => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
