//! Outbound history result envelopes.

use serde::{Deserialize, Serialize};

use crate::config::ConnectorIdentity;
use crate::context::ProcessingContext;
use crate::messaging::{Message, CONNECTOR_TYPE_HEADER};
use crate::utils::iso_timestamp;

/// Type of every result envelope sent to the engine.
pub const HISTORY_RESULT_TYPE: &str = "com.redhat.console.notifications.history";

/// CloudEvents spec version of result envelopes.
pub const SPEC_VERSION: &str = "1.0";

/// Content type of result envelope data.
pub const DATA_CONTENT_TYPE: &str = "application/json";

/// The envelope reporting a delivery outcome to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResult {
    /// Always [`HISTORY_RESULT_TYPE`].
    #[serde(rename = "type")]
    pub result_type: String,
    /// Always [`SPEC_VERSION`].
    pub specversion: String,
    /// The reporting connector.
    pub source: String,
    /// Same id as the inbound envelope.
    pub id: String,
    /// When the result was built (UTC).
    pub time: String,
    /// Always [`DATA_CONTENT_TYPE`].
    pub datacontenttype: String,
    /// The outcome.
    pub data: HistoryData,
}

/// Payload of a [`HistoryResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryData {
    /// Whether the delivery succeeded.
    pub successful: bool,
    /// Processing duration in milliseconds.
    pub duration: u64,
    /// Delivery details.
    pub details: HistoryDetails,
}

/// Details of a [`HistoryData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDetails {
    /// Type of the inbound event.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Where the event was delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Human-readable outcome.
    pub outcome: String,
}

impl HistoryResult {
    /// Parses a result envelope from a published message body.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Builds result envelopes for one connector.
#[derive(Debug, Clone, Copy)]
pub struct OutboundResultBuilder {
    source: ConnectorIdentity,
}

impl OutboundResultBuilder {
    /// Creates a builder reporting as `source`.
    #[must_use]
    pub fn new(source: ConnectorIdentity) -> Self {
        Self { source }
    }

    /// Builds the result for a finished context.
    #[must_use]
    pub fn build(&self, ctx: &ProcessingContext) -> HistoryResult {
        // Whole milliseconds, rounded up, never zero
        let duration = u64::try_from(ctx.elapsed().as_micros().div_ceil(1000).max(1))
            .unwrap_or(u64::MAX);
        let outcome = ctx.outcome.clone().unwrap_or_else(|| {
            if ctx.successful {
                "Event sent successfully".to_string()
            } else {
                "Delivery failed".to_string()
            }
        });

        HistoryResult {
            result_type: HISTORY_RESULT_TYPE.to_string(),
            specversion: SPEC_VERSION.to_string(),
            source: self.source.to_string(),
            id: ctx.id.clone(),
            time: iso_timestamp(),
            datacontenttype: DATA_CONTENT_TYPE.to_string(),
            data: HistoryData {
                successful: ctx.successful,
                duration,
                details: HistoryDetails {
                    event_type: ctx.event_type.clone(),
                    target: ctx.target_url.clone(),
                    outcome,
                },
            },
        }
    }

    /// Builds the result and wraps it in a message ready to publish.
    pub fn to_message(&self, ctx: &ProcessingContext) -> Result<Message, serde_json::Error> {
        let body = serde_json::to_string(&self.build(ctx))?;
        Ok(Message::new(body).with_header(CONNECTOR_TYPE_HEADER, self.source.as_str()))
    }
}
