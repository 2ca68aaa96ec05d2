//! Error types for the connector delivery pipeline.
//!
//! The taxonomy separates failures that are decided once (malformed
//! envelopes, bad configuration) from delivery failures whose retryability
//! is decided by an [`OutcomeClassifier`](crate::delivery::OutcomeClassifier).

use thiserror::Error;

/// The main error type for connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The inbound envelope could not be decoded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// The delivery executor failed.
    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    /// Publishing a message failed.
    #[error("{0}")]
    Publish(#[from] PublishError),

    /// Republishing a message to the inbound topic failed.
    #[error("{0}")]
    Reinjection(#[from] ReinjectionPublishError),

    /// The external payload could not be fetched.
    #[error("{0}")]
    Payload(#[from] PayloadError),

    /// The configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error raised when an inbound envelope cannot be decoded.
///
/// Decode errors are never retried and never reinjected.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The body is not valid JSON.
    #[error("Decode error: invalid JSON body: {0}")]
    InvalidJson(String),

    /// The body is valid JSON but not an object.
    #[error("Decode error: envelope must be a JSON object")]
    NotAnObject,

    /// A required envelope attribute is missing or has the wrong type.
    #[error("Decode error: missing or invalid attribute '{0}'")]
    MissingAttribute(&'static str),

    /// The `data` attribute is neither an object nor a JSON-encoded object.
    #[error("Decode error: invalid data attribute: {0}")]
    InvalidData(String),
}

/// Errors returned by a delivery executor.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// An I/O failure while talking to the external service.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external service did not answer in time.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The connection to the external service could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The external service answered with a non-success HTTP status.
    #[error("HTTP operation failed with status {status}: {body}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The response body, possibly empty.
        body: String,
    },

    /// The external service rejected the event (validation, auth...).
    #[error("Rejected by target: {0}")]
    Rejected(String),

    /// A connector-specific failure.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DeliveryError {
    /// Creates an HTTP status error.
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for I/O and connection-class failures.
    ///
    /// Opaque connector errors count when they wrap a `std::io::Error`.
    #[must_use]
    pub fn is_io_class(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout(_) | Self::Connection(_) => true,
            Self::Other(err) => err.chain().any(|cause| cause.is::<std::io::Error>()),
            Self::Http { .. } | Self::Rejected(_) => false,
        }
    }
}

/// Error raised when a message cannot be published to a topic.
#[derive(Debug, Clone, Error)]
#[error("Failed to publish to topic '{topic}': {reason}")]
pub struct PublishError {
    /// The destination topic.
    pub topic: String,
    /// Why the publish failed.
    pub reason: String,
}

impl PublishError {
    /// Creates a new publish error.
    #[must_use]
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal error raised when a reinjected message cannot be republished.
///
/// There is no retry tier after reinjection, so this error identifies the
/// lost message for alerting.
#[derive(Debug, Clone, Error)]
#[error("Reinjection of message {id} (orgId={org_id}, count={reinjection_count}) failed: {source}")]
pub struct ReinjectionPublishError {
    /// The correlation id of the lost message.
    pub id: String,
    /// The tenant of the lost message.
    pub org_id: String,
    /// The reinjection count the republished message would have carried.
    pub reinjection_count: u32,
    /// The underlying publish failure.
    #[source]
    pub source: PublishError,
}

/// Error raised when an off-loaded payload cannot be fetched.
#[derive(Debug, Clone, Error)]
pub enum PayloadError {
    /// The store has no payload under that reference.
    #[error("Payload '{0}' not found")]
    NotFound(String),

    /// The store could not be reached or returned garbage.
    #[error("Payload '{reference}' could not be fetched: {reason}")]
    Unavailable {
        /// The payload reference id.
        reference: String,
        /// Why the lookup failed.
        reason: String,
    },
}

/// Error raised when the connector configuration is invalid.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A configuration value failed validation.
    #[error("Invalid configuration for '{key}': {message}")]
    Invalid {
        /// The configuration key.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The configuration could not be loaded.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        Self::Load(err.to_string())
    }
}
