//! Publisher seam.

use async_trait::async_trait;

use super::Message;
use crate::errors::PublishError;

/// Publishes messages to a named topic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes one message. Returns once the broker accepted it.
    async fn publish(&self, topic: &str, message: Message) -> Result<(), PublishError>;
}
