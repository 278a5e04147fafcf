use std::time::Duration;

use crate::messaging::KafkaConfig;
use crate::utils::RetryConfig;

// ============================================================================
// Settings - read from the environment, local-development defaults
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Batches are published inside a Kafka transaction unless
/// `KAFKA_TRANSACTIONAL_ID=none`; without one a failed send can leave part
/// of a batch on the topic.
pub const DEFAULT_TRANSACTIONAL_ID: &str = "scylla-cqrs-publisher";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub kafka_brokers: String,
    pub scylla_hosts: Vec<String>,
    pub scylla_keyspace: String,
    pub events_topic: String,
    pub kafka_transactional_id: Option<String>,
    pub metrics_port: u16,
    pub dispatch_max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kafka_brokers: "127.0.0.1:9092".to_string(),
            scylla_hosts: vec!["127.0.0.1:9042".to_string()],
            scylla_keyspace: "home_inventory".to_string(),
            events_topic: "home-inventory.events".to_string(),
            kafka_transactional_id: Some(DEFAULT_TRANSACTIONAL_ID.to_string()),
            metrics_port: 9090,
            dispatch_max_attempts: 3,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source; unset or empty values keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Self::default();

        if let Some(brokers) = get("KAFKA_BROKERS") {
            settings.kafka_brokers = brokers;
        }
        if let Some(hosts) = get("SCYLLA_HOSTS") {
            settings.scylla_hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(keyspace) = get("SCYLLA_KEYSPACE") {
            if !keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::Invalid {
                    name: "SCYLLA_KEYSPACE",
                    value: keyspace,
                    reason: "only letters, digits and underscores are allowed".to_string(),
                });
            }
            settings.scylla_keyspace = keyspace;
        }
        if let Some(topic) = get("EVENTS_TOPIC") {
            settings.events_topic = topic;
        }
        if let Some(id) = get("KAFKA_TRANSACTIONAL_ID") {
            settings.kafka_transactional_id = (!id.eq_ignore_ascii_case("none")).then_some(id);
        }
        if let Some(port) = get("METRICS_PORT") {
            settings.metrics_port = parse("METRICS_PORT", port)?;
        }
        if let Some(attempts) = get("DISPATCH_MAX_ATTEMPTS") {
            settings.dispatch_max_attempts = parse("DISPATCH_MAX_ATTEMPTS", attempts)?;
        }

        Ok(settings)
    }

    pub fn kafka(&self) -> KafkaConfig {
        let config = KafkaConfig::new(&self.kafka_brokers, &self.events_topic);
        match &self.kafka_transactional_id {
            Some(id) => config.with_transactional_id(id),
            None => config,
        }
    }

    pub fn dispatch_retry(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            ..RetryConfig::with_max_attempts(self.dispatch_max_attempts)
        }
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        assert_eq!(settings(&[]).unwrap(), Settings::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let s = settings(&[
            ("KAFKA_BROKERS", "kafka:9092"),
            ("SCYLLA_HOSTS", "a:9042, b:9042"),
            ("EVENTS_TOPIC", "events"),
            ("KAFKA_TRANSACTIONAL_ID", "writer-1"),
            ("METRICS_PORT", "9100"),
            ("DISPATCH_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();

        assert_eq!(s.scylla_hosts, vec!["a:9042", "b:9042"]);
        assert_eq!(s.metrics_port, 9100);
        assert_eq!(s.dispatch_retry().max_attempts, 5);
        assert_eq!(s.kafka().transactional_id.as_deref(), Some("writer-1"));
        assert_eq!(s.kafka().topic, "events");
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = settings(&[("METRICS_PORT", "ninety")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "METRICS_PORT", .. }));

        assert!(settings(&[("SCYLLA_KEYSPACE", "drop table;")]).is_err());
    }

    #[test]
    fn test_empty_values_keep_defaults() {
        let s = settings(&[("KAFKA_BROKERS", "  "), ("KAFKA_TRANSACTIONAL_ID", "")]).unwrap();
        assert_eq!(s.kafka_brokers, "127.0.0.1:9092");
        assert_eq!(s.kafka_transactional_id.as_deref(), Some(DEFAULT_TRANSACTIONAL_ID));
    }

    #[test]
    fn test_publisher_is_transactional_unless_disabled() {
        let default = settings(&[]).unwrap();
        assert_eq!(default.kafka().transactional_id.as_deref(), Some(DEFAULT_TRANSACTIONAL_ID));

        let disabled = settings(&[("KAFKA_TRANSACTIONAL_ID", "none")]).unwrap();
        assert!(disabled.kafka().transactional_id.is_none());
    }
}
