//! Configuration management for the coordinator.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unset variables take their default; a variable that is set but does not
//! parse is an error rather than a silent default.

use netsaga_core::subject::ResourceKind;
use netsaga_runtime::RetryPolicy;
use netsaga_runtime::aggregate_store::DEFAULT_KEY_PREFIX;
use serde::Serialize;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set to a value that does not parse
    #[error("Invalid value '{value}' for {key}")]
    Invalid {
        /// Environment variable name
        key: &'static str,
        /// The offending value
        value: String,
    },
}

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Message bus
    pub redpanda: RedpandaConfig,
    /// Aggregate store
    pub redis: RedisConfig,
    /// Resource kind the subjects are derived from
    pub resource: ResourceKind,
    /// Compare-and-set retry on the response path
    pub conflicts: ConflictConfig,
    /// Dispatcher loop
    pub dispatcher: DispatcherConfig,
    /// Prometheus exporter
    pub metrics: MetricsConfig,
}

/// RedPanda/Kafka configuration
#[derive(Debug, Clone, Serialize)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Consumer group shared by every coordinator instance
    pub consumer_group: String,
    /// Where a new consumer group starts reading
    pub auto_offset_reset: String,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(skip)]
    pub url: String,
    /// Prefix prepended to service ids to form store keys
    pub key_prefix: String,
}

/// Retry of lost compare-and-set races.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherConfig {
    /// Pause before subscribing again after the stream ended or failed
    pub resubscribe_delay_secs: u64,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize)]
pub struct MetricsConfig {
    /// Whether to serve `/metrics`
    pub enabled: bool,
    /// Listen address of the exporter
    pub addr: SocketAddr,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a variable that is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a variable that is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        let metrics_host = vars.string("METRICS_HOST", "0.0.0.0");
        let metrics_port: u16 = vars.parse("METRICS_PORT", 9090)?;

        Ok(Self {
            redpanda: RedpandaConfig {
                brokers: vars.string("REDPANDA_BROKERS", "localhost:9092"),
                consumer_group: vars.string("CONSUMER_GROUP", "networks-coordinator"),
                auto_offset_reset: vars.string("REDPANDA_AUTO_OFFSET_RESET", "latest"),
            },
            redis: RedisConfig {
                url: vars.string("REDIS_URL", "redis://localhost:6379"),
                key_prefix: vars.string("STORE_KEY_PREFIX", DEFAULT_KEY_PREFIX),
            },
            resource: ResourceKind::new(
                vars.string("RESOURCE_PLURAL", "networks"),
                vars.string("RESOURCE_SINGULAR", "network"),
            ),
            conflicts: ConflictConfig {
                max_retries: vars.parse("CONFLICT_MAX_RETRIES", 5)?,
                initial_delay_ms: vars.parse("CONFLICT_INITIAL_DELAY_MS", 10)?,
            },
            dispatcher: DispatcherConfig {
                resubscribe_delay_secs: vars.parse("RESUBSCRIBE_DELAY_SECS", 5)?,
            },
            metrics: MetricsConfig {
                enabled: vars.parse("METRICS_ENABLED", true)?,
                addr: format!("{metrics_host}:{metrics_port}")
                    .parse()
                    .map_err(|_| ConfigError::Invalid {
                        key: "METRICS_HOST",
                        value: metrics_host.clone(),
                    })?,
            },
        })
    }

    /// Retry policy for compare-and-set conflicts.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.conflicts.max_retries)
            .initial_delay(Duration::from_millis(self.conflicts.initial_delay_ms))
            .build()
    }

    /// Pause between subscription attempts.
    #[must_use]
    pub const fn resubscribe_delay(&self) -> Duration {
        Duration::from_secs(self.dispatcher.resubscribe_delay_secs)
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match (self.0)(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();

        assert_eq!(config.redpanda.brokers, "localhost:9092");
        assert_eq!(config.redpanda.consumer_group, "networks-coordinator");
        assert_eq!(config.redpanda.auto_offset_reset, "latest");
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.redis.key_prefix, "GPBNetworks_");
        assert_eq!(config.resource, ResourceKind::networks());
        assert_eq!(config.conflicts.max_retries, 5);
        assert_eq!(config.resubscribe_delay(), Duration::from_secs(5));
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.addr, "0.0.0.0:9090".parse().unwrap());
    }

    #[test]
    fn variables_override_defaults() {
        let config = load(&[
            ("RESOURCE_PLURAL", "routers"),
            ("RESOURCE_SINGULAR", "router"),
            ("CONFLICT_MAX_RETRIES", "9"),
            ("CONFLICT_INITIAL_DELAY_MS", "25"),
            ("METRICS_ENABLED", "false"),
            ("METRICS_PORT", "9100"),
            ("STORE_KEY_PREFIX", "Test_"),
        ])
        .unwrap();

        assert_eq!(config.resource.plural, "routers");
        assert_eq!(config.resource.singular, "router");
        assert_eq!(config.redis.key_prefix, "Test_");
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.addr.port(), 9100);

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 9);
        assert_eq!(policy.initial_delay, Duration::from_millis(25));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let error = load(&[("CONFLICT_MAX_RETRIES", "lots")]).unwrap_err();

        assert_eq!(
            error,
            ConfigError::Invalid {
                key: "CONFLICT_MAX_RETRIES",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn malformed_metrics_host_is_rejected() {
        let error = load(&[("METRICS_HOST", "not a host")]).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { key: "METRICS_HOST", .. }));
    }
}
