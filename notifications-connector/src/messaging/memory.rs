//! In-process broker.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{Message, MessagePublisher};
use crate::errors::PublishError;

const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 1024;

/// A topic broker living in process memory.
///
/// Every published message is kept in the topic history and forwarded to
/// the live subscribers of that topic. Publishing to a topic marked as
/// failing returns a [`PublishError`].
#[derive(Debug)]
pub struct InMemoryBroker {
    history: DashMap<String, Vec<Message>>,
    subscribers: DashMap<String, Vec<mpsc::Sender<Message>>>,
    failing_topics: RwLock<HashSet<String>>,
    capacity: usize,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }
}

impl InMemoryBroker {
    /// Creates a broker with the default subscription capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker whose subscriptions buffer `capacity` messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: DashMap::new(),
            subscribers: DashMap::new(),
            failing_topics: RwLock::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to the messages published to `topic` from now on.
    pub fn subscribe(&self, topic: &str) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.entry(topic.to_string()).or_default().push(tx);
        rx
    }

    /// Returns every message published to `topic`.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<Message> {
        self.history
            .get(topic)
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Returns the number of messages published to `topic`.
    #[must_use]
    pub fn published_count(&self, topic: &str) -> usize {
        self.history.get(topic).map_or(0, |messages| messages.len())
    }

    /// Makes every publish to `topic` fail until [`Self::restore`] is called.
    pub fn fail_publishes_to(&self, topic: impl Into<String>) {
        self.failing_topics.write().insert(topic.into());
    }

    /// Stops failing publishes to `topic`.
    pub fn restore(&self, topic: &str) {
        self.failing_topics.write().remove(topic);
    }

    /// Clears the history of every topic.
    pub fn clear(&self) {
        self.history.clear();
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), PublishError> {
        if self.failing_topics.read().contains(topic) {
            return Err(PublishError::new(topic, "broker unavailable"));
        }

        self.history
            .entry(topic.to_string())
            .or_default()
            .push(message.clone());

        // Clone the senders so no map guard is held across an await
        let senders: Vec<mpsc::Sender<Message>> = self
            .subscribers
            .get(topic)
            .map(|subs| subs.clone())
            .unwrap_or_default();

        for sender in &senders {
            if sender.send(message.clone()).await.is_err() {
                trace!(topic = %topic, "Dropping closed subscription");
            }
        }

        if let Some(mut subs) = self.subscribers.get_mut(topic) {
            subs.retain(|sender| !sender.is_closed());
        }

        debug!(topic = %topic, subscribers = senders.len(), "Message published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_records_history() {
        let broker = InMemoryBroker::new();
        broker.publish("a", Message::new("1")).await.unwrap();
        broker.publish("a", Message::new("2")).await.unwrap();
        broker.publish("b", Message::new("3")).await.unwrap();

        assert_eq!(broker.published_count("a"), 2);
        assert_eq!(broker.published("b")[0].body, "3");
        assert!(broker.published("c").is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_messages() {
        let broker = InMemoryBroker::new();
        let mut rx = broker.subscribe("inbound");

        broker.publish("inbound", Message::new("hello")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.body, "hello");
    }

    #[tokio::test]
    async fn test_closed_subscriptions_are_dropped() {
        let broker = InMemoryBroker::new();
        drop(broker.subscribe("inbound"));

        broker.publish("inbound", Message::new("x")).await.unwrap();
        assert!(broker.subscribers.get("inbound").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_topic() {
        let broker = InMemoryBroker::new();
        broker.fail_publishes_to("outbound");

        let err = broker
            .publish("outbound", Message::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err.topic, "outbound");
        assert_eq!(broker.published_count("outbound"), 0);

        broker.restore("outbound");
        tokio_test::assert_ok!(broker.publish("outbound", Message::new("x")).await);
    }
}
