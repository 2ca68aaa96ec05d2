//! Connector configuration.
//!
//! Values come from code (fluent builders) or from environment variables
//! prefixed with [`DEFAULT_ENV_PREFIX`], e.g.
//! `NOTIFICATIONS_CONNECTOR_INBOUND_TOPIC`.

mod identity;

pub use identity::{ConnectorIdentity, UnknownIdentity};

use crate::errors::ConfigError;
use crate::pipeline::{RedeliveryBackoff, RedeliveryPolicy, ReinjectionPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::info;

/// Prefix of the environment variables read by [`ConnectorConfig::from_env`].
pub const DEFAULT_ENV_PREFIX: &str = "NOTIFICATIONS_CONNECTOR";

/// What to do with a failed delivery once the local tier gives up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureAction {
    /// Publish a failure result to the engine.
    Report,
    /// Republish the original envelope to the inbound topic after a delay.
    Reinject,
}

/// Configuration for one connector instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// This connector's own identity.
    pub identity: ConnectorIdentity,
    /// Identities accepted by the inbound filter. Empty means `[identity]`.
    #[serde(default)]
    pub accepted_identities: Vec<ConnectorIdentity>,
    /// Topic consumed by the connector.
    #[serde(default = "default_inbound_topic")]
    pub inbound_topic: String,
    /// Topic receiving the result envelopes.
    #[serde(default = "default_outbound_topic")]
    pub outbound_topic: String,
    /// Consumer group id. Derived from the identity when unset.
    #[serde(default)]
    pub consumer_group_id: Option<String>,
    /// Consumer max-poll-interval in milliseconds.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
    /// Maximum number of records pulled per poll.
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
    /// Maximum number of records processed concurrently.
    #[serde(default = "default_consumer_concurrency")]
    pub consumer_concurrency: usize,
    /// Local retries performed after the first attempt.
    #[serde(default = "default_redelivery_max_attempts")]
    pub redelivery_max_attempts: u32,
    /// Delay before the first local retry, in milliseconds.
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
    /// How the local retry delay evolves between attempts.
    #[serde(default)]
    pub redelivery_backoff: RedeliveryBackoff,
    /// Name of the counter incremented on every local retry.
    #[serde(default = "default_redelivery_counter_name")]
    pub redelivery_counter_name: String,
    /// Divisor applied to the max-poll-interval for late reinjections.
    #[serde(default = "default_reinjection_poll_interval_divisor")]
    pub reinjection_poll_interval_divisor: u64,
    /// Optional cap on the number of reinjection cycles.
    #[serde(default)]
    pub max_reinjections: Option<u32>,
    /// Action taken when transient failures exhaust the local budget.
    #[serde(default = "default_on_exhaustion")]
    pub on_exhaustion: FailureAction,
    /// Action taken on a terminal failure.
    #[serde(default = "default_on_terminal_failure")]
    pub on_terminal_failure: FailureAction,
}

fn default_inbound_topic() -> String {
    "platform.notifications.tocamel".to_string()
}

fn default_outbound_topic() -> String {
    "platform.notifications.fromcamel".to_string()
}

const fn default_max_poll_interval_ms() -> u64 {
    300_000
}

const fn default_max_poll_records() -> usize {
    500
}

const fn default_consumer_concurrency() -> usize {
    1
}

const fn default_redelivery_max_attempts() -> u32 {
    2
}

const fn default_redelivery_delay_ms() -> u64 {
    1000
}

fn default_redelivery_counter_name() -> String {
    "notifications.connector.redelivery".to_string()
}

const fn default_reinjection_poll_interval_divisor() -> u64 {
    2
}

const fn default_on_exhaustion() -> FailureAction {
    FailureAction::Reinject
}

const fn default_on_terminal_failure() -> FailureAction {
    FailureAction::Report
}

impl ConnectorConfig {
    /// Creates a configuration with defaults for the given identity.
    #[must_use]
    pub fn new(identity: ConnectorIdentity) -> Self {
        Self {
            identity,
            accepted_identities: Vec::new(),
            inbound_topic: default_inbound_topic(),
            outbound_topic: default_outbound_topic(),
            consumer_group_id: None,
            max_poll_interval_ms: default_max_poll_interval_ms(),
            max_poll_records: default_max_poll_records(),
            consumer_concurrency: default_consumer_concurrency(),
            redelivery_max_attempts: default_redelivery_max_attempts(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
            redelivery_backoff: RedeliveryBackoff::default(),
            redelivery_counter_name: default_redelivery_counter_name(),
            reinjection_poll_interval_divisor: default_reinjection_poll_interval_divisor(),
            max_reinjections: None,
            on_exhaustion: default_on_exhaustion(),
            on_terminal_failure: default_on_terminal_failure(),
        }
    }

    /// Loads and validates the configuration from `NOTIFICATIONS_CONNECTOR_*`
    /// environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Loads and validates the configuration from `<prefix>_*` environment
    /// variables. `ACCEPTED_IDENTITIES` is a comma-separated list.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let loaded: Self = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(prefix)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("accepted_identities"),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Sets the identities accepted by the inbound filter.
    #[must_use]
    pub fn with_accepted_identities(mut self, identities: Vec<ConnectorIdentity>) -> Self {
        self.accepted_identities = identities;
        self
    }

    /// Sets the inbound topic.
    #[must_use]
    pub fn with_inbound_topic(mut self, topic: impl Into<String>) -> Self {
        self.inbound_topic = topic.into();
        self
    }

    /// Sets the outbound topic.
    #[must_use]
    pub fn with_outbound_topic(mut self, topic: impl Into<String>) -> Self {
        self.outbound_topic = topic.into();
        self
    }

    /// Sets the consumer group id.
    #[must_use]
    pub fn with_consumer_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.consumer_group_id = Some(group_id.into());
        self
    }

    /// Sets the max-poll-interval.
    #[must_use]
    pub fn with_max_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.max_poll_interval_ms = interval_ms;
        self
    }

    /// Sets the max number of records per poll.
    #[must_use]
    pub fn with_max_poll_records(mut self, records: usize) -> Self {
        self.max_poll_records = records;
        self
    }

    /// Sets the consumer concurrency.
    #[must_use]
    pub fn with_consumer_concurrency(mut self, concurrency: usize) -> Self {
        self.consumer_concurrency = concurrency;
        self
    }

    /// Sets the number of local retries.
    #[must_use]
    pub fn with_redelivery_max_attempts(mut self, attempts: u32) -> Self {
        self.redelivery_max_attempts = attempts;
        self
    }

    /// Sets the local retry delay.
    #[must_use]
    pub fn with_redelivery_delay_ms(mut self, delay_ms: u64) -> Self {
        self.redelivery_delay_ms = delay_ms;
        self
    }

    /// Sets the local retry backoff.
    #[must_use]
    pub fn with_redelivery_backoff(mut self, backoff: RedeliveryBackoff) -> Self {
        self.redelivery_backoff = backoff;
        self
    }

    /// Sets the reinjection max-poll-interval divisor.
    #[must_use]
    pub fn with_reinjection_poll_interval_divisor(mut self, divisor: u64) -> Self {
        self.reinjection_poll_interval_divisor = divisor;
        self
    }

    /// Caps the number of reinjection cycles.
    #[must_use]
    pub fn with_max_reinjections(mut self, max: u32) -> Self {
        self.max_reinjections = Some(max);
        self
    }

    /// Sets the action taken once transient failures exhaust local retries.
    #[must_use]
    pub fn with_on_exhaustion(mut self, action: FailureAction) -> Self {
        self.on_exhaustion = action;
        self
    }

    /// Sets the action taken on terminal failures.
    #[must_use]
    pub fn with_on_terminal_failure(mut self, action: FailureAction) -> Self {
        self.on_terminal_failure = action;
        self
    }

    /// Returns the effective set of accepted identities.
    #[must_use]
    pub fn accepted_identities(&self) -> BTreeSet<ConnectorIdentity> {
        if self.accepted_identities.is_empty() {
            BTreeSet::from([self.identity])
        } else {
            self.accepted_identities.iter().copied().collect()
        }
    }

    /// Returns the effective consumer group id.
    #[must_use]
    pub fn consumer_group_id(&self) -> String {
        self.consumer_group_id
            .clone()
            .unwrap_or_else(|| format!("notifications-connector-{}", self.identity))
    }

    /// Returns the local redelivery policy.
    #[must_use]
    pub fn redelivery_policy(&self) -> RedeliveryPolicy {
        RedeliveryPolicy::new()
            .with_max_attempts(self.redelivery_max_attempts)
            .with_delay(Duration::from_millis(self.redelivery_delay_ms))
            .with_backoff(self.redelivery_backoff)
    }

    /// Returns the reinjection policy.
    #[must_use]
    pub fn reinjection_policy(&self) -> ReinjectionPolicy {
        ReinjectionPolicy::new(self.max_poll_interval_ms)
            .with_divisor(self.reinjection_poll_interval_divisor)
            .with_max_reinjections(self.max_reinjections)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbound_topic.trim().is_empty() {
            return Err(ConfigError::invalid("inbound_topic", "must not be empty"));
        }
        if self.outbound_topic.trim().is_empty() {
            return Err(ConfigError::invalid("outbound_topic", "must not be empty"));
        }
        if self.inbound_topic == self.outbound_topic {
            return Err(ConfigError::invalid(
                "outbound_topic",
                "must differ from the inbound topic",
            ));
        }
        if self.max_poll_interval_ms == 0 {
            return Err(ConfigError::invalid("max_poll_interval_ms", "must be positive"));
        }
        if self.max_poll_records == 0 {
            return Err(ConfigError::invalid("max_poll_records", "must be positive"));
        }
        if self.consumer_concurrency == 0 {
            return Err(ConfigError::invalid("consumer_concurrency", "must be positive"));
        }
        if self.reinjection_poll_interval_divisor == 0 {
            return Err(ConfigError::invalid(
                "reinjection_poll_interval_divisor",
                "must be positive",
            ));
        }
        if !self.accepted_identities().contains(&self.identity) {
            return Err(ConfigError::invalid(
                "accepted_identities",
                format!(
                    "must contain the connector identity '{}' or reinjected messages are never consumed",
                    self.identity
                ),
            ));
        }

        let worst_case_wait = self.redelivery_policy().total_delay();
        if worst_case_wait >= Duration::from_millis(self.max_poll_interval_ms) {
            return Err(ConfigError::invalid(
                "redelivery_delay_ms",
                format!(
                    "local retries may wait {}ms which reaches max_poll_interval_ms ({})",
                    worst_case_wait.as_millis(),
                    self.max_poll_interval_ms
                ),
            ));
        }

        Ok(())
    }

    /// Returns the configuration as sorted key/value pairs for logging.
    #[must_use]
    pub fn logged_configuration(&self) -> BTreeMap<&'static str, String> {
        let accepted: Vec<&str> = self
            .accepted_identities()
            .iter()
            .map(ConnectorIdentity::as_str)
            .collect();

        let mut map = BTreeMap::new();
        map.insert("identity", self.identity.to_string());
        map.insert("accepted_identities", accepted.join(","));
        map.insert("inbound_topic", self.inbound_topic.clone());
        map.insert("outbound_topic", self.outbound_topic.clone());
        map.insert("consumer_group_id", self.consumer_group_id());
        map.insert("max_poll_interval_ms", self.max_poll_interval_ms.to_string());
        map.insert("max_poll_records", self.max_poll_records.to_string());
        map.insert("consumer_concurrency", self.consumer_concurrency.to_string());
        map.insert("redelivery_max_attempts", self.redelivery_max_attempts.to_string());
        map.insert("redelivery_delay_ms", self.redelivery_delay_ms.to_string());
        map.insert("redelivery_backoff", format!("{:?}", self.redelivery_backoff));
        map.insert("redelivery_counter_name", self.redelivery_counter_name.clone());
        map.insert(
            "reinjection_poll_interval_divisor",
            self.reinjection_poll_interval_divisor.to_string(),
        );
        map.insert(
            "max_reinjections",
            self.max_reinjections
                .map_or_else(|| "unbounded".to_string(), |max| max.to_string()),
        );
        map.insert("on_exhaustion", format!("{:?}", self.on_exhaustion));
        map.insert("on_terminal_failure", format!("{:?}", self.on_terminal_failure));
        map
    }

    /// Logs the startup configuration.
    pub fn log_configuration(&self) {
        info!("=== Startup configuration ===");
        for (key, value) in self.logged_configuration() {
            info!("{}={}", key, value);
        }
    }
}
