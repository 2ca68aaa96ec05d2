//! Reinjection: the slow retry tier.
//!
//! A message that failed locally is republished, verbatim, to the inbound
//! topic after a delay staged by its reinjection count. The delay runs in a
//! spawned timer task so the consumer moves on immediately.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ConnectorIdentity;
use crate::context::ProcessingContext;
use crate::errors::ReinjectionPublishError;
use crate::messaging::{
    Headers, Message, MessagePublisher, CONNECTOR_TYPE_HEADER, PAYLOAD_REFERENCE_HEADER,
    REINJECTION_COUNT_HEADER,
};
use crate::metrics::{MetricsSink, CONNECTOR_TAG, REINJECTION_FAILED};

/// Delay of the first three reinjection cycles, in milliseconds.
const STAGED_DELAYS_MS: [u64; 3] = [10_000, 30_000, 60_000];

/// Returns the delay before republishing a message whose inbound
/// reinjection count is `count`.
///
/// Counts 0, 1 and 2 wait 10s, 30s and 60s. Later cycles wait
/// `max_poll_interval_ms / divisor`.
#[must_use]
pub fn reinjection_delay(count: u32, max_poll_interval_ms: u64, divisor: u64) -> Duration {
    let millis = usize::try_from(count)
        .ok()
        .and_then(|index| STAGED_DELAYS_MS.get(index).copied())
        .unwrap_or_else(|| max_poll_interval_ms / divisor.max(1));
    Duration::from_millis(millis)
}

/// Reinjection delays and cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinjectionPolicy {
    /// Consumer max-poll-interval.
    pub max_poll_interval_ms: u64,
    /// Divisor applied to the max-poll-interval from the fourth cycle on.
    pub divisor: u64,
    /// Optional cap on the number of cycles.
    pub max_reinjections: Option<u32>,
}

impl Default for ReinjectionPolicy {
    fn default() -> Self {
        Self::new(300_000)
    }
}

impl ReinjectionPolicy {
    /// Creates an uncapped policy with divisor 2.
    #[must_use]
    pub fn new(max_poll_interval_ms: u64) -> Self {
        Self {
            max_poll_interval_ms,
            divisor: 2,
            max_reinjections: None,
        }
    }

    /// Sets the divisor.
    #[must_use]
    pub fn with_divisor(mut self, divisor: u64) -> Self {
        self.divisor = divisor;
        self
    }

    /// Sets or clears the cap.
    #[must_use]
    pub fn with_max_reinjections(mut self, max: Option<u32>) -> Self {
        self.max_reinjections = max;
        self
    }

    /// Returns the delay for a message with the given inbound count.
    #[must_use]
    pub fn delay_for(&self, count: u32) -> Duration {
        reinjection_delay(count, self.max_poll_interval_ms, self.divisor)
    }

    /// Returns true if a message with the given inbound count may be
    /// reinjected once more.
    #[must_use]
    pub fn allows(&self, count: u32) -> bool {
        self.max_reinjections.map_or(true, |max| count < max)
    }
}

/// A reinjection handed to the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReinjection {
    /// Correlation id of the message.
    pub id: String,
    /// Reinjection count carried by the republished message.
    pub count: u32,
    /// Time before the message is republished.
    pub delay: Duration,
}

/// Schedules delayed republishing of failed messages.
pub struct ReinjectionController {
    identity: ConnectorIdentity,
    inbound_topic: String,
    policy: ReinjectionPolicy,
    publisher: Arc<dyn MessagePublisher>,
    metrics: Arc<dyn MetricsSink>,
    alerts: Option<mpsc::UnboundedSender<ReinjectionPublishError>>,
    flush: CancellationToken,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReinjectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReinjectionController")
            .field("identity", &self.identity)
            .field("inbound_topic", &self.inbound_topic)
            .field("policy", &self.policy)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ReinjectionController {
    /// Creates a controller republishing to `inbound_topic` as `identity`.
    #[must_use]
    pub fn new(
        identity: ConnectorIdentity,
        inbound_topic: impl Into<String>,
        policy: ReinjectionPolicy,
        publisher: Arc<dyn MessagePublisher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            identity,
            inbound_topic: inbound_topic.into(),
            policy,
            publisher,
            metrics,
            alerts: None,
            flush: CancellationToken::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Sends every lost message to `alerts`.
    #[must_use]
    pub fn with_alerts(mut self, alerts: mpsc::UnboundedSender<ReinjectionPublishError>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &ReinjectionPolicy {
        &self.policy
    }

    /// Builds the message republished for `original`.
    ///
    /// The body is kept verbatim. Headers are rebuilt: this connector's
    /// identity, the incremented count, and the payload reference if any.
    #[must_use]
    pub fn reinjected_message(&self, original: &Message, count: u32) -> Message {
        let mut headers = Headers::new()
            .with(CONNECTOR_TYPE_HEADER, self.identity.as_str())
            .with(REINJECTION_COUNT_HEADER, count.to_string());
        if let Some(reference) = original.headers.payload_reference() {
            headers.insert(PAYLOAD_REFERENCE_HEADER, reference);
        }
        Message {
            body: original.body.clone(),
            headers,
        }
    }

    /// Schedules the republishing of `original` and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, original: &Message, ctx: &ProcessingContext) -> ScheduledReinjection {
        let count = ctx.reinjection_count.saturating_add(1);
        let delay = self.policy.delay_for(ctx.reinjection_count);
        let message = self.reinjected_message(original, count);

        info!(
            id = %ctx.id,
            org_id = %ctx.org_id_or_empty(),
            connector = %self.identity,
            reinjection_count = count,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduling reinjection"
        );

        let task = ReinjectionTask {
            id: ctx.id.clone(),
            org_id: ctx.org_id_or_empty().to_string(),
            count,
            topic: self.inbound_topic.clone(),
            identity: self.identity,
            publisher: Arc::clone(&self.publisher),
            metrics: Arc::clone(&self.metrics),
            alerts: self.alerts.clone(),
        };
        let flush = self.flush.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = flush.cancelled() => {}
            }
            task.publish(message).await;
        });

        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);

        ScheduledReinjection {
            id: ctx.id.clone(),
            count,
            delay,
        }
    }

    /// Returns the number of reinjections not yet published.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Publishes every pending reinjection now, skipping the remaining
    /// delays. Reinjections scheduled afterwards are published immediately.
    pub fn flush(&self) {
        self.flush.cancel();
    }

    /// Waits until every pending reinjection has been published or failed.
    pub async fn wait_for_pending(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                error!(error = %err, "Reinjection task panicked");
            }
        }
    }
}

/// Everything a timer task needs to republish one message.
struct ReinjectionTask {
    id: String,
    org_id: String,
    count: u32,
    topic: String,
    identity: ConnectorIdentity,
    publisher: Arc<dyn MessagePublisher>,
    metrics: Arc<dyn MetricsSink>,
    alerts: Option<mpsc::UnboundedSender<ReinjectionPublishError>>,
}

impl ReinjectionTask {
    async fn publish(self, message: Message) {
        match self.publisher.publish(&self.topic, message).await {
            Ok(()) => {
                info!(
                    id = %self.id,
                    org_id = %self.org_id,
                    reinjection_count = self.count,
                    "Message reinjected"
                );
            }
            Err(source) => {
                let lost = ReinjectionPublishError {
                    id: self.id,
                    org_id: self.org_id,
                    reinjection_count: self.count,
                    source,
                };
                error!(error = %lost, "Reinjected message lost");
                self.metrics
                    .increment(REINJECTION_FAILED, &[(CONNECTOR_TAG, self.identity.as_str())]);
                if let Some(alerts) = &self.alerts {
                    // Receiver may be dropped during shutdown
                    let _ = alerts.send(lost);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PublishError;
    use crate::messaging::{InMemoryBroker, MockMessagePublisher};
    use crate::metrics::InMemoryMetrics;
    use pretty_assertions::assert_eq;

    const INBOUND: &str = "platform.notifications.tocamel";

    fn controller(publisher: Arc<dyn MessagePublisher>, metrics: Arc<InMemoryMetrics>) -> ReinjectionController {
        ReinjectionController::new(
            ConnectorIdentity::Slack,
            INBOUND,
            ReinjectionPolicy::new(300_000),
            publisher,
            metrics,
        )
    }

    fn context(count: u32) -> ProcessingContext {
        ProcessingContext::new("e-1", ConnectorIdentity::Slack)
            .with_org_id("org-1")
            .with_reinjection_count(count)
    }

    #[test]
    fn test_staged_delays() {
        assert_eq!(reinjection_delay(0, 300_000, 2), Duration::from_millis(10_000));
        assert_eq!(reinjection_delay(1, 300_000, 2), Duration::from_millis(30_000));
        assert_eq!(reinjection_delay(2, 300_000, 2), Duration::from_millis(60_000));
        assert_eq!(reinjection_delay(3, 300_000, 2), Duration::from_millis(150_000));
        assert_eq!(reinjection_delay(42, 300_000, 2), Duration::from_millis(150_000));
        assert_eq!(reinjection_delay(u32::MAX, 90_000, 3), Duration::from_millis(30_000));
    }

    #[test]
    fn test_policy_cap() {
        let uncapped = ReinjectionPolicy::default();
        assert!(uncapped.allows(1_000));

        let capped = ReinjectionPolicy::default().with_max_reinjections(Some(3));
        assert!(capped.allows(2));
        assert!(!capped.allows(3));
    }

    #[test]
    fn test_reinjected_message_headers() {
        let broker = Arc::new(InMemoryBroker::new());
        let controller = controller(broker, Arc::new(InMemoryMetrics::new()));
        let original = Message::new(r#"{"id":"e-1"}"#)
            .with_header(CONNECTOR_TYPE_HEADER, "slack")
            .with_header(PAYLOAD_REFERENCE_HEADER, "payload-1")
            .with_header("x-unrelated", "dropped");

        let message = controller.reinjected_message(&original, 4);

        assert_eq!(message.body, original.body);
        assert_eq!(message.headers.connector_type(), Some("slack"));
        assert_eq!(message.headers.reinjection_count(), 4);
        assert_eq!(message.headers.payload_reference(), Some("payload-1"));
        assert!(!message.headers.contains("x-unrelated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_publishes_after_delay() {
        let broker = Arc::new(InMemoryBroker::new());
        let controller = controller(broker.clone(), Arc::new(InMemoryMetrics::new()));
        let original = Message::new(r#"{"id":"e-1"}"#);

        let scheduled = controller.schedule(&original, &context(0));
        assert_eq!(scheduled.count, 1);
        assert_eq!(scheduled.delay, Duration::from_millis(10_000));
        assert_eq!(broker.published_count(INBOUND), 0);
        assert_eq!(controller.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(9_000)).await;
        assert_eq!(broker.published_count(INBOUND), 0);

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        controller.wait_for_pending().await;
        let published = broker.published(INBOUND);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].headers.reinjection_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_skips_remaining_delay() {
        let broker = Arc::new(InMemoryBroker::new());
        let controller = controller(broker.clone(), Arc::new(InMemoryMetrics::new()));
        let start = tokio::time::Instant::now();

        controller.schedule(&Message::new("a"), &context(2));
        controller.schedule(&Message::new("b"), &context(5));
        controller.flush();
        controller.wait_for_pending().await;

        assert_eq!(broker.published_count(INBOUND), 2);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(controller.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_is_surfaced() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|topic, _| Err(PublishError::new(topic.to_string(), "broker down")));
        let metrics = Arc::new(InMemoryMetrics::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = controller(Arc::new(publisher), metrics.clone()).with_alerts(tx);

        controller.schedule(&Message::new("body"), &context(1));
        controller.flush();
        controller.wait_for_pending().await;

        let lost = rx.recv().await.unwrap();
        assert_eq!(lost.id, "e-1");
        assert_eq!(lost.org_id, "org-1");
        assert_eq!(lost.reinjection_count, 2);
        assert_eq!(lost.source.topic, INBOUND);
        assert_eq!(metrics.count(REINJECTION_FAILED, &[("connector", "slack")]), 1);
    }
}
