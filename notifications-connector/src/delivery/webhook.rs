//! Generic webhook executor.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{endpoint_url, DeliveryExecutor, DeliveryReport};
use crate::context::ProcessingContext;
use crate::errors::DeliveryError;

/// Request timeout used by [`WebhookExecutor::new`].
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs the event payload as JSON to `endpoint_properties.url`.
///
/// Pair it with [`HttpStatusClassifier`](super::HttpStatusClassifier) so
/// throttling and 5xx answers are retried.
#[derive(Debug, Clone)]
pub struct WebhookExecutor {
    client: Client,
}

impl WebhookExecutor {
    /// Creates an executor with the default timeout.
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_timeout(DEFAULT_WEBHOOK_TIMEOUT)
    }

    /// Creates an executor with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Other(anyhow::Error::new(e).context("building HTTP client")))?;
        Ok(Self { client })
    }

    /// Creates an executor around an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn map_request_error(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::timeout(err.to_string())
    } else if err.is_connect() {
        DeliveryError::connection(err.to_string())
    } else if let Some(status) = err.status() {
        DeliveryError::http(status.as_u16(), err.to_string())
    } else {
        DeliveryError::Other(anyhow::Error::new(err).context("webhook request failed"))
    }
}

#[async_trait]
impl DeliveryExecutor for WebhookExecutor {
    async fn execute(
        &self,
        ctx: &ProcessingContext,
        payload: &Value,
    ) -> Result<DeliveryReport, DeliveryError> {
        let url = endpoint_url(payload)
            .ok_or_else(|| DeliveryError::rejected("missing endpoint_properties.url"))?;

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::http(status.as_u16(), body));
        }

        debug!(id = %ctx.id, target = %url, status = status.as_u16(), "Webhook delivered");
        Ok(DeliveryReport::default())
    }
}
