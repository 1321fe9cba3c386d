//! Client configuration.
//!
//! Values come from the environment (optionally a `.env` file) and can be
//! overridden through the builder, which is what the CLI does with its flags.

use crate::consts::*;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    backend_origin: String,
    channel_capacity: usize,
    session_cache_path: PathBuf,
    session_ttl: chrono::Duration,
    poll_interval: Duration,
    poll_attempts: u32,
    response_timeout: Option<Duration>,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn with_backend_origin(mut self, origin: &str) -> Self {
        self.config.backend_origin = origin.trim_end_matches('/').to_string();
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_session_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.session_cache_path = path.into();
        self
    }

    pub fn with_session_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn with_poll_attempts(mut self, attempts: u32) -> Self {
        self.config.poll_attempts = attempts;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_origin: DEFAULT_BACKEND_ORIGIN.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            session_cache_path: PathBuf::from(DEFAULT_SESSION_CACHE_PATH),
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            response_timeout: None,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Loads configuration from environment variables.
    ///
    /// *   `BACKEND_ORIGIN`: HTTP origin of the session service and gateway. Defaults to `http://localhost:8000`.
    /// *   `CHANNEL_CAPACITY`: Capacity of the inbound/outbound envelope channels. Defaults to 1024.
    /// *   `SESSION_CACHE_PATH`: Where the resumable session record is kept.
    /// *   `SESSION_TTL_HOURS`: Session lifetime when the service sends no expiry. Defaults to 24.
    /// *   `TRANSCRIPTION_POLL_INTERVAL_MS` / `TRANSCRIPTION_POLL_ATTEMPTS`: Upload transcription polling. Defaults to 1000 / 30.
    /// *   `RESPONSE_TIMEOUT_SECS`: (Optional) Clears a pending response after this many seconds. Unset keeps it pending forever.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let mut builder = ConfigBuilder::from_config(defaults);

        if let Some(origin) = lookup(BACKEND_ORIGIN) {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(ConfigError::InvalidValue(
                    BACKEND_ORIGIN.to_string(),
                    format!("'{}' is not an http(s) origin", origin),
                ));
            }
            builder = builder.with_backend_origin(&origin);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, CHANNEL_CAPACITY)? {
            builder = builder.with_channel_capacity(capacity);
        }
        if let Some(path) = lookup(SESSION_CACHE_PATH) {
            builder = builder.with_session_cache_path(path);
        }
        if let Some(hours) = parse_var::<i64>(&lookup, SESSION_TTL_HOURS)? {
            builder = builder.with_session_ttl(chrono::Duration::hours(hours));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, TRANSCRIPTION_POLL_INTERVAL_MS)? {
            builder = builder.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, TRANSCRIPTION_POLL_ATTEMPTS)? {
            builder = builder.with_poll_attempts(attempts);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, RESPONSE_TIMEOUT_SECS)? {
            builder = builder.with_response_timeout(Some(Duration::from_secs(secs)));
        }

        Ok(builder.build())
    }

    pub fn backend_origin(&self) -> &str {
        &self.backend_origin
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn session_cache_path(&self) -> &Path {
        &self.session_cache_path
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        self.session_ttl
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("'{}': {}", raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend_origin(), "http://localhost:8000");
        assert_eq!(config.poll_attempts(), 30);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.response_timeout().is_none());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = Config::from_lookup(lookup(&[
            (BACKEND_ORIGIN, "https://tutor.example.com/"),
            (SESSION_TTL_HOURS, "2"),
            (RESPONSE_TIMEOUT_SECS, "45"),
        ]))
        .unwrap();
        assert_eq!(config.backend_origin(), "https://tutor.example.com");
        assert_eq!(config.session_ttl(), chrono::Duration::hours(2));
        assert_eq!(config.response_timeout(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = Config::from_lookup(lookup(&[(TRANSCRIPTION_POLL_ATTEMPTS, "many")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(key, _)) if key == TRANSCRIPTION_POLL_ATTEMPTS));
    }

    #[test]
    fn test_non_http_origin_is_rejected() {
        let result = Config::from_lookup(lookup(&[(BACKEND_ORIGIN, "ws://localhost:8000")]));
        assert!(result.is_err());
    }
}
