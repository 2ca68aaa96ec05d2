//! Per-message processing state.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ConnectorIdentity;
use crate::envelope::Envelope;
use crate::messaging::Headers;
use crate::utils::{now_utc, Timestamp};

/// In-flight state for one delivery cycle of one inbound message.
///
/// A context is created when the message is decoded and ends with exactly
/// one terminal action: an outbound report or a reinjection.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// Correlation id of the inbound envelope.
    pub id: String,
    /// Tenant identifier, when the envelope carries one.
    pub org_id: Option<String>,
    /// The connector handling the message.
    pub connector: ConnectorIdentity,
    /// Type of the inbound event.
    pub event_type: String,
    /// When processing started. Drives the reported duration.
    pub start_time: Instant,
    /// Wall-clock time the message was picked up.
    pub received_at: Timestamp,
    /// Where the connector delivers the event, when known.
    pub target_url: Option<String>,
    /// Reinjection cycles this message already went through.
    pub reinjection_count: u32,
    /// Reference of an off-loaded payload.
    pub payload_reference: Option<String>,
    /// Delivery attempts performed in this cycle.
    pub attempts: u32,
    /// Human-readable outcome reported to the engine.
    pub outcome: Option<String>,
    /// Whether the delivery succeeded.
    pub successful: bool,
}

impl ProcessingContext {
    /// Creates a context for a message with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>, connector: ConnectorIdentity) -> Self {
        Self {
            id: id.into(),
            org_id: None,
            connector,
            event_type: String::new(),
            start_time: Instant::now(),
            received_at: now_utc(),
            target_url: None,
            reinjection_count: 0,
            payload_reference: None,
            attempts: 0,
            outcome: None,
            successful: false,
        }
    }

    /// Creates a context from a decoded envelope and its message headers.
    #[must_use]
    pub fn from_envelope(
        envelope: &Envelope,
        connector: ConnectorIdentity,
        headers: &Headers,
    ) -> Self {
        let mut ctx = Self::new(envelope.id.clone(), connector)
            .with_event_type(envelope.event_type.clone())
            .with_reinjection_count(headers.reinjection_count());
        ctx.org_id = envelope.org_id().map(str::to_string);
        ctx.payload_reference = headers.payload_reference().map(str::to_string);
        ctx
    }

    /// Sets the event type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Sets the tenant identifier.
    #[must_use]
    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Sets the reinjection count.
    #[must_use]
    pub fn with_reinjection_count(mut self, count: u32) -> Self {
        self.reinjection_count = count;
        self
    }

    /// Sets the target URL.
    #[must_use]
    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    /// Returns the time elapsed since processing started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the tenant identifier, or an empty string.
    #[must_use]
    pub fn org_id_or_empty(&self) -> &str {
        self.org_id.as_deref().unwrap_or_default()
    }

    /// Marks the delivery as successful.
    pub fn record_success(&mut self, outcome: impl Into<String>) {
        self.successful = true;
        self.outcome = Some(outcome.into());
    }

    /// Marks the delivery as failed.
    pub fn record_failure(&mut self, outcome: impl Into<String>) {
        self.successful = false;
        self.outcome = Some(outcome.into());
    }

    /// Returns the context as a JSON object for structured logs.
    #[must_use]
    pub fn to_dict(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "org_id": self.org_id,
            "connector": self.connector.as_str(),
            "event_type": self.event_type,
            "target_url": self.target_url,
            "reinjection_count": self.reinjection_count,
            "attempts": self.attempts,
            "successful": self.successful,
            "outcome": self.outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decode;
    use crate::messaging::{PAYLOAD_REFERENCE_HEADER, REINJECTION_COUNT_HEADER};
    use serde_json::json;

    #[test]
    fn test_from_envelope_reads_headers() {
        let envelope = decode(
            &json!({"id": "e-1", "type": "t", "data": {"org_id": "org-1"}}).to_string(),
        )
        .unwrap();
        let headers = Headers::new()
            .with(REINJECTION_COUNT_HEADER, "2")
            .with(PAYLOAD_REFERENCE_HEADER, "payload-9");

        let ctx = ProcessingContext::from_envelope(&envelope, ConnectorIdentity::Slack, &headers);

        assert_eq!(ctx.id, "e-1");
        assert_eq!(ctx.event_type, "t");
        assert_eq!(ctx.org_id.as_deref(), Some("org-1"));
        assert_eq!(ctx.reinjection_count, 2);
        assert_eq!(ctx.payload_reference.as_deref(), Some("payload-9"));
        assert_eq!(ctx.outcome, None);
    }

    #[test]
    fn test_record_outcomes() {
        let mut ctx = ProcessingContext::new("id", ConnectorIdentity::Teams);
        ctx.record_success("Event sent successfully");
        assert!(ctx.successful);

        ctx.record_failure("Connection refused");
        assert!(!ctx.successful);
        assert_eq!(ctx.outcome.as_deref(), Some("Connection refused"));
    }

    #[test]
    fn test_to_dict() {
        let ctx = ProcessingContext::new("id", ConnectorIdentity::Webhook).with_org_id("org");
        let dict = ctx.to_dict();
        assert_eq!(dict["connector"], "webhook");
        assert_eq!(dict["org_id"], "org");
        assert_eq!(ctx.org_id_or_empty(), "org");
    }
}
