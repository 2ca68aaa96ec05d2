//! Broker-neutral message representation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Header carrying the identity of the connector a message is meant for.
pub const CONNECTOR_TYPE_HEADER: &str = "connector-type";

/// Header carrying the number of reinjection cycles a message went through.
pub const REINJECTION_COUNT_HEADER: &str = "reinjection-count";

/// Header carrying the id of a payload stored outside the envelope.
pub const PAYLOAD_REFERENCE_HEADER: &str = "payload-reference-id";

/// String message headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Creates empty headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a header, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a header value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Removes a header, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the headers in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the connector-type header.
    #[must_use]
    pub fn connector_type(&self) -> Option<&str> {
        self.get(CONNECTOR_TYPE_HEADER)
    }

    /// Returns the payload-reference header.
    #[must_use]
    pub fn payload_reference(&self) -> Option<&str> {
        self.get(PAYLOAD_REFERENCE_HEADER)
    }

    /// Returns the reinjection count, 0 when absent.
    ///
    /// An unparseable value is logged and read as 0.
    #[must_use]
    pub fn reinjection_count(&self) -> u32 {
        match self.get(REINJECTION_COUNT_HEADER) {
            None => 0,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Ignoring invalid {} header", REINJECTION_COUNT_HEADER);
                0
            }),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A record consumed from or published to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The raw body, kept verbatim.
    pub body: String,
    /// The message headers.
    pub headers: Headers,
}

impl Message {
    /// Creates a message without headers.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            headers: Headers::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reinjection_count_defaults_to_zero() {
        assert_eq!(Headers::new().reinjection_count(), 0);
    }

    #[test]
    fn test_reinjection_count_parses_value() {
        let headers = Headers::new().with(REINJECTION_COUNT_HEADER, "3");
        assert_eq!(headers.reinjection_count(), 3);
    }

    #[test]
    fn test_reinjection_count_invalid_is_zero() {
        let headers = Headers::new().with(REINJECTION_COUNT_HEADER, "-1");
        assert_eq!(headers.reinjection_count(), 0);
    }

    #[test]
    fn test_message_builder() {
        let message = Message::new("{}")
            .with_header(CONNECTOR_TYPE_HEADER, "slack")
            .with_header(PAYLOAD_REFERENCE_HEADER, "p-1");

        assert_eq!(message.headers.connector_type(), Some("slack"));
        assert_eq!(message.headers.payload_reference(), Some("p-1"));
        assert_eq!(message.headers.len(), 2);
    }

    #[test]
    fn test_headers_from_iter_sorted() {
        let headers: Headers = [("b", "2"), ("a", "1")].into_iter().collect();
        let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
