//! Configuration Settings
//!
//! Configuration types for the ingest service, loaded from environment
//! variables with sane defaults. Unparseable values fall back to their
//! defaults; only values that are set but semantically empty are errors.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::validation::{ValidationConfig, ValidationMode};
use crate::infrastructure::publish::AckLevel;

/// TCP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Host to bind the listener on.
    pub bind_host: String,
    /// Port to bind the listener on.
    pub bind_port: u16,
    /// Soft cap on concurrently open connections.
    pub max_connections: usize,
    /// Inactivity window after which a connection is considered dead.
    pub idle_timeout: Duration,
    /// Delay before restarting the listener after a post-bind error.
    pub listener_retry_delay: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 7070,
            max_connections: 256,
            idle_timeout: Duration::from_secs(300),
            listener_retry_delay: Duration::from_secs(5),
        }
    }
}

impl ServerSettings {
    /// The listener's bind address, `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}

/// Tick-log publisher settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Broker addresses, tried in order.
    pub brokers: Vec<String>,
    /// Topic the enriched ticks are published under.
    pub topic: String,
    /// Acknowledgment level requested from the broker.
    pub acks: AckLevel,
    /// Retry ceiling per record, beyond the first attempt.
    pub max_retries: u32,
    /// Bound on one delivery attempt.
    pub request_timeout: Duration,
    /// Initial delay between delivery attempts.
    pub retry_delay_initial: Duration,
    /// Ceiling on the delay between delivery attempts.
    pub retry_delay_max: Duration,
    /// Grace period for in-flight records at shutdown.
    pub shutdown_grace: Duration,
    /// Capacity of the publish intake channel.
    pub channel_capacity: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            topic: "price-ticks".to_string(),
            acks: AckLevel::Leader,
            max_retries: 5,
            request_timeout: Duration::from_secs(2),
            retry_delay_initial: Duration::from_millis(200),
            retry_delay_max: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
            channel_capacity: 1024,
        }
    }
}

/// Validation engine settings.
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    /// Strict or permissive anomaly handling.
    pub mode: ValidationMode,
    /// Maximum relative price deviation before a record is flagged.
    pub max_deviation: Decimal,
    /// Maximum event timestamp age.
    pub max_timestamp_age: Duration,
    /// Forward clock-skew allowance.
    pub max_future_skew: Duration,
    /// Sanity ceiling for prices, bids, and asks.
    pub price_ceiling: Decimal,
    /// Sanity ceiling for traded volume.
    pub volume_ceiling: Decimal,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        let config = ValidationConfig::default();
        Self {
            mode: config.mode,
            max_deviation: config.max_deviation,
            max_timestamp_age: config.max_timestamp_age,
            max_future_skew: config.max_future_skew,
            price_ceiling: config.price_ceiling,
            volume_ceiling: config.volume_ceiling,
        }
    }
}

impl From<ValidationSettings> for ValidationConfig {
    fn from(settings: ValidationSettings) -> Self {
        Self {
            mode: settings.mode,
            max_deviation: settings.max_deviation,
            max_timestamp_age: settings.max_timestamp_age,
            max_future_skew: settings.max_future_skew,
            price_ceiling: settings.price_ceiling,
            volume_ceiling: settings.volume_ceiling,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// TCP server settings.
    pub server: ServerSettings,
    /// Tick-log publisher settings.
    pub log: LogSettings,
    /// Validation engine settings.
    pub validation: ValidationSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a set variable is semantically empty, e.g. an
    /// empty broker list or topic.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = ServerSettings {
            bind_host: parse_env_string("TICK_INGEST_BIND_HOST", &ServerSettings::default().bind_host),
            bind_port: parse_env_u16("TICK_INGEST_BIND_PORT", ServerSettings::default().bind_port),
            max_connections: parse_env_usize(
                "TICK_INGEST_MAX_CONNECTIONS",
                ServerSettings::default().max_connections,
            ),
            idle_timeout: parse_env_duration_secs(
                "TICK_INGEST_IDLE_TIMEOUT_SECS",
                ServerSettings::default().idle_timeout,
            ),
            listener_retry_delay: parse_env_duration_secs(
                "TICK_INGEST_LISTENER_RETRY_DELAY_SECS",
                ServerSettings::default().listener_retry_delay,
            ),
        };

        let brokers = parse_env_list("TICK_LOG_BROKERS", &LogSettings::default().brokers);
        if brokers.is_empty() {
            return Err(ConfigError::EmptyValue("TICK_LOG_BROKERS".to_string()));
        }

        let topic = parse_env_string("TICK_LOG_TOPIC", &LogSettings::default().topic);
        if topic.is_empty() {
            return Err(ConfigError::EmptyValue("TICK_LOG_TOPIC".to_string()));
        }

        let log = LogSettings {
            brokers,
            topic,
            acks: std::env::var("TICK_LOG_ACKS")
                .map(|s| AckLevel::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            max_retries: parse_env_u32("TICK_LOG_RETRIES", LogSettings::default().max_retries),
            request_timeout: parse_env_duration_millis(
                "TICK_LOG_REQUEST_TIMEOUT_MS",
                LogSettings::default().request_timeout,
            ),
            retry_delay_initial: parse_env_duration_millis(
                "TICK_LOG_RETRY_DELAY_INITIAL_MS",
                LogSettings::default().retry_delay_initial,
            ),
            retry_delay_max: parse_env_duration_secs(
                "TICK_LOG_RETRY_DELAY_MAX_SECS",
                LogSettings::default().retry_delay_max,
            ),
            shutdown_grace: parse_env_duration_secs(
                "TICK_LOG_SHUTDOWN_GRACE_SECS",
                LogSettings::default().shutdown_grace,
            ),
            channel_capacity: parse_env_usize(
                "TICK_LOG_CHANNEL_CAPACITY",
                LogSettings::default().channel_capacity,
            ),
        };

        let validation = ValidationSettings {
            mode: std::env::var("TICK_VALIDATION_MODE")
                .map(|s| ValidationMode::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            max_deviation: parse_env_decimal(
                "TICK_MAX_PRICE_DEVIATION",
                ValidationSettings::default().max_deviation,
            ),
            max_timestamp_age: parse_env_duration_secs(
                "TICK_MAX_TIMESTAMP_AGE_SECS",
                ValidationSettings::default().max_timestamp_age,
            ),
            max_future_skew: parse_env_duration_secs(
                "TICK_MAX_FUTURE_SKEW_SECS",
                ValidationSettings::default().max_future_skew,
            ),
            price_ceiling: parse_env_decimal(
                "TICK_PRICE_CEILING",
                ValidationSettings::default().price_ceiling,
            ),
            volume_ceiling: parse_env_decimal(
                "TICK_VOLUME_CEILING",
                ValidationSettings::default().volume_ceiling,
            ),
        };

        Ok(Self {
            server,
            log,
            validation,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env_list(key: &str, default: &[String]) -> Vec<String> {
    std::env::var(key).map_or_else(
        |_| default.to_vec(),
        |v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        },
    )
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.bind_addr(), "0.0.0.0:7070");
        assert_eq!(settings.max_connections, 256);
        assert_eq!(settings.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn log_settings_defaults() {
        let settings = LogSettings::default();
        assert_eq!(settings.brokers, vec!["127.0.0.1:9092".to_string()]);
        assert_eq!(settings.topic, "price-ticks");
        assert_eq!(settings.acks, AckLevel::Leader);
        assert_eq!(settings.max_retries, 5);
    }

    #[test]
    fn validation_settings_match_engine_defaults() {
        let settings = ValidationSettings::default();
        assert_eq!(settings.mode, ValidationMode::Permissive);
        assert_eq!(settings.max_deviation, Decimal::new(10, 2));
        assert_eq!(settings.max_timestamp_age, Duration::from_secs(300));
        assert_eq!(settings.max_future_skew, Duration::from_secs(60));
    }

    #[test]
    fn validation_settings_convert_to_engine_config() {
        let settings = ValidationSettings {
            mode: ValidationMode::Strict,
            ..ValidationSettings::default()
        };
        let config = ValidationConfig::from(settings);
        assert_eq!(config.mode, ValidationMode::Strict);
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        // The process environment is shared across the test binary, so only
        // the unset path is exercised here.
        let defaults = vec!["x:1".to_string()];
        assert_eq!(parse_env_list("TICK_TEST_UNSET_VARIABLE", &defaults), defaults);
        assert_eq!(parse_env_u16("TICK_TEST_UNSET_VARIABLE", 7), 7);
        assert_eq!(
            parse_env_duration_secs("TICK_TEST_UNSET_VARIABLE", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        assert_eq!(
            parse_env_decimal("TICK_TEST_UNSET_VARIABLE", Decimal::ONE),
            Decimal::ONE
        );
    }
}
