//! Test fixtures for connector testing.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::ScriptedExecutor;
use crate::config::{ConnectorConfig, ConnectorIdentity};
use crate::envelope::{HistoryResult, ORG_ID_KEY};
use crate::errors::ConfigError;
use crate::messaging::{
    InMemoryBroker, Message, CONNECTOR_TYPE_HEADER, PAYLOAD_REFERENCE_HEADER,
    REINJECTION_COUNT_HEADER,
};
use crate::metrics::{InMemoryMetrics, CONNECTOR_TAG};
use crate::pipeline::ConnectorPipeline;
use crate::utils::{generate_uuid, iso_timestamp};

/// Builds inbound envelopes and their messages.
#[derive(Debug, Clone)]
pub struct EnvelopeFixture {
    /// Correlation id.
    pub id: String,
    /// Event type.
    pub event_type: String,
    /// Extra `data` entries.
    pub data: Map<String, Value>,
    /// Encode `data` as a JSON string.
    pub data_as_string: bool,
    /// Value of the `connector-type` header. `None` omits it.
    pub connector_type: Option<String>,
    /// Value of the `reinjection-count` header.
    pub reinjection_count: Option<u32>,
    /// Value of the `payload-reference-id` header.
    pub payload_reference: Option<String>,
}

impl EnvelopeFixture {
    /// Creates an envelope addressed to `identity` with a random id.
    #[must_use]
    pub fn new(identity: ConnectorIdentity) -> Self {
        let mut data = Map::new();
        data.insert(ORG_ID_KEY.to_string(), json!("org-123"));
        Self {
            id: generate_uuid().to_string(),
            event_type: format!("com.redhat.console.notification.toCamel.{identity}"),
            data,
            data_as_string: false,
            connector_type: Some(identity.to_string()),
            reinjection_count: None,
            payload_reference: None,
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the tenant identifier.
    #[must_use]
    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.data.insert(ORG_ID_KEY.to_string(), Value::String(org_id.into()));
        self
    }

    /// Sets `endpoint_properties.url`.
    #[must_use]
    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.data
            .insert("endpoint_properties".to_string(), json!({ "url": url.into() }));
        self
    }

    /// Adds a `data` entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Encodes `data` as a JSON string.
    #[must_use]
    pub fn with_string_data(mut self) -> Self {
        self.data_as_string = true;
        self
    }

    /// Sets or removes the `connector-type` header.
    #[must_use]
    pub fn with_connector_type(mut self, value: Option<&str>) -> Self {
        self.connector_type = value.map(str::to_string);
        self
    }

    /// Sets the `reinjection-count` header.
    #[must_use]
    pub fn with_reinjection_count(mut self, count: u32) -> Self {
        self.reinjection_count = Some(count);
        self
    }

    /// Sets the `payload-reference-id` header.
    #[must_use]
    pub fn with_payload_reference(mut self, reference: impl Into<String>) -> Self {
        self.payload_reference = Some(reference.into());
        self
    }

    /// Returns the envelope as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let data = Value::Object(self.data.clone());
        json!({
            "id": self.id,
            "type": self.event_type,
            "specversion": "1.0",
            "source": "notifications-engine",
            "time": iso_timestamp(),
            "data": if self.data_as_string { Value::String(data.to_string()) } else { data },
        })
    }

    /// Returns the inbound message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        self.message_with_body(self.to_json().to_string())
    }

    /// Returns a message with this fixture's headers and a custom body.
    #[must_use]
    pub fn message_with_body(&self, body: impl Into<String>) -> Message {
        let mut message = Message::new(body);
        if let Some(connector_type) = &self.connector_type {
            message.headers.insert(CONNECTOR_TYPE_HEADER, connector_type.as_str());
        }
        if let Some(count) = self.reinjection_count {
            message.headers.insert(REINJECTION_COUNT_HEADER, count.to_string());
        }
        if let Some(reference) = &self.payload_reference {
            message.headers.insert(PAYLOAD_REFERENCE_HEADER, reference.as_str());
        }
        message
    }
}

/// A pipeline wired to an in-memory broker, metrics registry and scripted
/// executor.
#[derive(Debug)]
pub struct TestConnector {
    /// The pipeline under test.
    pub pipeline: Arc<ConnectorPipeline>,
    /// Receives outbound results and reinjected messages.
    pub broker: Arc<InMemoryBroker>,
    /// Receives every counter increment.
    pub metrics: Arc<InMemoryMetrics>,
    /// The executor.
    pub executor: Arc<ScriptedExecutor>,
    config: ConnectorConfig,
}

impl TestConnector {
    /// Builds the harness.
    pub fn new(config: ConnectorConfig, executor: ScriptedExecutor) -> Result<Self, ConfigError> {
        let broker = Arc::new(InMemoryBroker::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let executor = Arc::new(executor);
        let pipeline = ConnectorPipeline::builder(config.clone())
            .executor(executor.clone())
            .publisher(broker.clone())
            .metrics(metrics.clone())
            .build()?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            broker,
            metrics,
            executor,
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Returns every result published to the outbound topic.
    ///
    /// Panics if a published body is not a result envelope.
    #[must_use]
    pub fn outbound_results(&self) -> Vec<HistoryResult> {
        self.broker
            .published(&self.config.outbound_topic)
            .iter()
            .map(|message| {
                HistoryResult::from_json(&message.body)
                    .unwrap_or_else(|e| panic!("invalid outbound body {}: {e}", message.body))
            })
            .collect()
    }

    /// Returns every message republished to the inbound topic.
    #[must_use]
    pub fn reinjected(&self) -> Vec<Message> {
        self.broker.published(&self.config.inbound_topic)
    }

    /// Returns the value of a counter tagged with this connector.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.metrics
            .count(name, &[(CONNECTOR_TAG, self.config.identity.as_str())])
    }

    /// Returns the value of the redelivery counter.
    #[must_use]
    pub fn redeliveries(&self) -> u64 {
        self.counter(&self.config.redelivery_counter_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decode;

    #[test]
    fn test_fixture_decodes() {
        let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack)
            .with_id("e-1")
            .with_org_id("org-9")
            .with_target_url("https://hooks.example.com");
        let envelope = decode(&fixture.to_message().body).unwrap();

        assert_eq!(envelope.id, "e-1");
        assert_eq!(envelope.org_id(), Some("org-9"));
        assert_eq!(
            envelope.data["endpoint_properties"]["url"],
            "https://hooks.example.com"
        );
    }

    #[test]
    fn test_fixture_string_data_decodes() {
        let fixture = EnvelopeFixture::new(ConnectorIdentity::Teams).with_string_data();
        assert!(fixture.to_json()["data"].is_string());
        assert_eq!(decode(&fixture.to_message().body).unwrap().org_id(), Some("org-123"));
    }

    #[test]
    fn test_fixture_headers() {
        let message = EnvelopeFixture::new(ConnectorIdentity::Slack)
            .with_reinjection_count(2)
            .with_payload_reference("p")
            .to_message();
        assert_eq!(message.headers.connector_type(), Some("slack"));
        assert_eq!(message.headers.reinjection_count(), 2);
        assert_eq!(message.headers.payload_reference(), Some("p"));

        let anonymous = EnvelopeFixture::new(ConnectorIdentity::Slack)
            .with_connector_type(None)
            .to_message();
        assert!(anonymous.headers.connector_type().is_none());
    }
}
