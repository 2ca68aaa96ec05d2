//! Executor seam.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;

use crate::context::ProcessingContext;
use crate::errors::DeliveryError;

/// Outcome reported when an executor does not provide one.
pub const SUCCESS_OUTCOME: &str = "Event sent successfully";

/// A successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Human-readable outcome reported to the engine.
    pub outcome: String,
}

impl DeliveryReport {
    /// Creates a report with a custom outcome.
    #[must_use]
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
        }
    }
}

impl Default for DeliveryReport {
    fn default() -> Self {
        Self::new(SUCCESS_OUTCOME)
    }
}

/// Reads `endpoint_properties.url` from an event payload.
#[must_use]
pub fn endpoint_url(payload: &Value) -> Option<String> {
    payload
        .pointer("/endpoint_properties/url")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Performs the connector-specific delivery of one event.
///
/// Implementations own every side effect (HTTP calls, SMTP...). The
/// pipeline measures timing and decides about retries.
#[async_trait]
pub trait DeliveryExecutor: Send + Sync {
    /// Delivers the event payload.
    async fn execute(
        &self,
        ctx: &ProcessingContext,
        payload: &Value,
    ) -> Result<DeliveryReport, DeliveryError>;

    /// Returns where the payload will be delivered, for reporting.
    fn target(&self, payload: &Value) -> Option<String> {
        endpoint_url(payload)
    }
}

/// An executor backed by an async closure.
pub struct FnExecutor<F> {
    func: F,
}

impl<F> FnExecutor<F> {
    /// Wraps a closure receiving owned copies of the context and payload.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> DeliveryExecutor for FnExecutor<F>
where
    F: Fn(ProcessingContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<DeliveryReport, DeliveryError>> + Send,
{
    async fn execute(
        &self,
        ctx: &ProcessingContext,
        payload: &Value,
    ) -> Result<DeliveryReport, DeliveryError> {
        (self.func)(ctx.clone(), payload.clone()).await
    }
}
