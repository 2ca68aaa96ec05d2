//! External payload store.
//!
//! Large payloads are stored outside the envelope; the message then carries
//! a `payload-reference-id` header and the pipeline fetches the payload
//! before delivery.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::errors::PayloadError;

/// Looks up off-loaded payloads by reference id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Fetches the payload stored under `reference`.
    async fn fetch(&self, reference: &str) -> Result<Value, PayloadError>;
}

/// A payload store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryPayloadStore {
    payloads: DashMap<String, Value>,
}

impl InMemoryPayloadStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a payload.
    pub fn insert(&self, reference: impl Into<String>, payload: Value) {
        self.payloads.insert(reference.into(), payload);
    }

    /// Removes a payload.
    pub fn remove(&self, reference: &str) -> Option<Value> {
        self.payloads.remove(reference).map(|(_, payload)| payload)
    }

    /// Returns the number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

#[async_trait]
impl PayloadStore for InMemoryPayloadStore {
    async fn fetch(&self, reference: &str) -> Result<Value, PayloadError> {
        self.payloads
            .get(reference)
            .map(|payload| payload.clone())
            .ok_or_else(|| PayloadError::NotFound(reference.to_string()))
    }
}
