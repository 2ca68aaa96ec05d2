//! The per-message delivery pipeline.
//!
//! filter -> decode -> resolve payload -> local redelivery -> classify ->
//! {report | reinject}. Every accepted message ends with exactly one
//! terminal action.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::redelivery::{LocalRedeliveryController, RedeliveryOutcome};
use super::reinjection::ReinjectionController;
use crate::config::{ConnectorConfig, FailureAction};
use crate::context::ProcessingContext;
use crate::delivery::{DefaultClassifier, DeliveryExecutor, FailureClass, OutcomeClassifier};
use crate::envelope::{decode, salvage_id, OutboundResultBuilder, UNKNOWN_ID};
use crate::errors::{ConfigError, ConnectorError, ReinjectionPublishError};
use crate::filter::InboundFilter;
use crate::messaging::{Message, MessagePublisher};
use crate::metrics::{
    MetricsSink, NoOpMetricsSink, CONNECTOR_TAG, MESSAGES_FAILED, MESSAGES_PROCESSED,
    MESSAGES_REINJECTED, MESSAGES_SUCCEEDED,
};
use crate::payload::PayloadStore;

/// Terminal action taken for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The message was not addressed to this connector.
    Filtered,
    /// An outcome was reported to the engine.
    Reported {
        /// Correlation id of the report.
        id: String,
        /// Whether the delivery succeeded.
        successful: bool,
    },
    /// The message was handed to the reinjection tier.
    Reinjected {
        /// Correlation id of the message.
        id: String,
        /// Reinjection count of the republished message.
        count: u32,
        /// Time before the message is republished.
        delay: Duration,
    },
}

/// Builder for [`ConnectorPipeline`].
pub struct ConnectorPipelineBuilder {
    config: ConnectorConfig,
    executor: Option<Arc<dyn DeliveryExecutor>>,
    publisher: Option<Arc<dyn MessagePublisher>>,
    classifier: Arc<dyn OutcomeClassifier>,
    metrics: Arc<dyn MetricsSink>,
    payload_store: Option<Arc<dyn PayloadStore>>,
    alerts: Option<mpsc::UnboundedSender<ReinjectionPublishError>>,
}

impl ConnectorPipelineBuilder {
    /// Sets the delivery executor. Required.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn DeliveryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the publisher used for results and reinjections. Required.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn MessagePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Replaces the [`DefaultClassifier`].
    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn OutcomeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replaces the [`NoOpMetricsSink`].
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the store resolving `payload-reference-id` headers.
    #[must_use]
    pub fn payload_store(mut self, store: Arc<dyn PayloadStore>) -> Self {
        self.payload_store = Some(store);
        self
    }

    /// Sends every lost reinjection to `alerts`.
    #[must_use]
    pub fn reinjection_alerts(
        mut self,
        alerts: mpsc::UnboundedSender<ReinjectionPublishError>,
    ) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Validates the configuration and builds the pipeline.
    pub fn build(self) -> Result<ConnectorPipeline, ConfigError> {
        self.config.validate()?;
        let executor = self
            .executor
            .ok_or_else(|| ConfigError::invalid("executor", "a delivery executor is required"))?;
        let publisher = self
            .publisher
            .ok_or_else(|| ConfigError::invalid("publisher", "a message publisher is required"))?;

        let identity = self.config.identity;
        let redelivery = LocalRedeliveryController::new(
            identity,
            self.config.redelivery_policy(),
            self.classifier,
            Arc::clone(&self.metrics),
            self.config.redelivery_counter_name.clone(),
        );
        let mut reinjection = ReinjectionController::new(
            identity,
            self.config.inbound_topic.clone(),
            self.config.reinjection_policy(),
            Arc::clone(&publisher),
            Arc::clone(&self.metrics),
        );
        if let Some(alerts) = self.alerts {
            reinjection = reinjection.with_alerts(alerts);
        }

        Ok(ConnectorPipeline {
            filter: InboundFilter::from_config(&self.config),
            outbound: OutboundResultBuilder::new(identity),
            config: self.config,
            executor,
            publisher,
            metrics: self.metrics,
            payload_store: self.payload_store,
            redelivery,
            reinjection,
        })
    }
}

/// Processes inbound messages for one connector.
pub struct ConnectorPipeline {
    config: ConnectorConfig,
    filter: InboundFilter,
    executor: Arc<dyn DeliveryExecutor>,
    publisher: Arc<dyn MessagePublisher>,
    metrics: Arc<dyn MetricsSink>,
    payload_store: Option<Arc<dyn PayloadStore>>,
    redelivery: LocalRedeliveryController,
    reinjection: ReinjectionController,
    outbound: OutboundResultBuilder,
}

impl std::fmt::Debug for ConnectorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorPipeline")
            .field("identity", &self.config.identity)
            .field("filter", &self.filter)
            .field("redelivery", &self.redelivery)
            .field("reinjection", &self.reinjection)
            .finish_non_exhaustive()
    }
}

impl ConnectorPipeline {
    /// Starts building a pipeline for `config`.
    #[must_use]
    pub fn builder(config: ConnectorConfig) -> ConnectorPipelineBuilder {
        ConnectorPipelineBuilder {
            config,
            executor: None,
            publisher: None,
            classifier: Arc::new(DefaultClassifier),
            metrics: Arc::new(NoOpMetricsSink),
            payload_store: None,
            alerts: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Returns the reinjection controller.
    #[must_use]
    pub fn reinjection(&self) -> &ReinjectionController {
        &self.reinjection
    }

    /// Processes one inbound message to its terminal action.
    ///
    /// Errors are returned only when the outbound report cannot be
    /// published or serialized.
    pub async fn process(&self, message: Message) -> Result<Disposition, ConnectorError> {
        if !self.filter.accepts(&message.headers) {
            debug!(
                connector_type = ?message.headers.connector_type(),
                "Ignoring message addressed to another connector"
            );
            return Ok(Disposition::Filtered);
        }
        self.count(MESSAGES_PROCESSED);

        let envelope = match decode(&message.body) {
            Ok(envelope) => envelope,
            Err(err) => {
                let id = salvage_id(&message.body).unwrap_or_else(|| UNKNOWN_ID.to_string());
                warn!(id = %id, error = %err, "Discarding malformed envelope");
                let mut ctx = ProcessingContext::new(id, self.config.identity);
                ctx.reinjection_count = message.headers.reinjection_count();
                ctx.record_failure(err.to_string());
                return self.report(ctx).await;
            }
        };

        let mut ctx =
            ProcessingContext::from_envelope(&envelope, self.config.identity, &message.headers);
        let payload = match self.resolve_payload(&ctx, envelope.data_value()).await {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    id = %ctx.id,
                    org_id = %ctx.org_id_or_empty(),
                    error = %err,
                    "Payload lookup failed"
                );
                ctx.record_failure(err.to_string());
                return self
                    .finish_failure(&message, ctx, self.config.on_exhaustion)
                    .await;
            }
        };
        ctx.target_url = self.executor.target(&payload);

        let executor = &self.executor;
        let (ctx_ref, payload_ref) = (&ctx, &payload);
        let outcome = self
            .redelivery
            .run(&ctx.id, move || executor.execute(ctx_ref, payload_ref))
            .await;
        ctx.attempts = outcome.attempts();

        match outcome {
            RedeliveryOutcome::Delivered { report, .. } => {
                ctx.record_success(report.outcome);
                self.report(ctx).await
            }
            RedeliveryOutcome::Failed { error, class, .. } => {
                error!(
                    id = %ctx.id,
                    org_id = %ctx.org_id_or_empty(),
                    target = ?ctx.target_url,
                    attempts = ctx.attempts,
                    reinjection_count = ctx.reinjection_count,
                    failure_class = ?class,
                    error = %error,
                    "Message delivery failed"
                );
                ctx.record_failure(error.to_string());
                let action = match class {
                    FailureClass::Transient => self.config.on_exhaustion,
                    FailureClass::Terminal => self.config.on_terminal_failure,
                };
                self.finish_failure(&message, ctx, action).await
            }
        }
    }

    async fn resolve_payload(
        &self,
        ctx: &ProcessingContext,
        inline: Value,
    ) -> Result<Value, ConnectorError> {
        match (&ctx.payload_reference, &self.payload_store) {
            (Some(reference), Some(store)) => {
                debug!(id = %ctx.id, payload_reference = %reference, "Fetching payload");
                Ok(store.fetch(reference).await?)
            }
            (Some(reference), None) => {
                warn!(
                    id = %ctx.id,
                    payload_reference = %reference,
                    "No payload store configured, using inline data"
                );
                Ok(inline)
            }
            (None, _) => Ok(inline),
        }
    }

    async fn finish_failure(
        &self,
        original: &Message,
        ctx: ProcessingContext,
        action: FailureAction,
    ) -> Result<Disposition, ConnectorError> {
        if action == FailureAction::Reinject {
            if self.reinjection.policy().allows(ctx.reinjection_count) {
                let scheduled = self.reinjection.schedule(original, &ctx);
                self.count(MESSAGES_REINJECTED);
                return Ok(Disposition::Reinjected {
                    id: scheduled.id,
                    count: scheduled.count,
                    delay: scheduled.delay,
                });
            }
            warn!(
                id = %ctx.id,
                reinjection_count = ctx.reinjection_count,
                "Reinjection limit reached, reporting failure"
            );
        }
        self.report(ctx).await
    }

    async fn report(&self, ctx: ProcessingContext) -> Result<Disposition, ConnectorError> {
        let message = self.outbound.to_message(&ctx)?;
        self.publisher
            .publish(&self.config.outbound_topic, message)
            .await?;

        self.count(if ctx.successful {
            MESSAGES_SUCCEEDED
        } else {
            MESSAGES_FAILED
        });
        debug!(
            id = %ctx.id,
            successful = ctx.successful,
            outcome = ?ctx.outcome,
            "Outcome reported"
        );

        Ok(Disposition::Reported {
            id: ctx.id,
            successful: ctx.successful,
        })
    }

    fn count(&self, name: &str) {
        self.metrics
            .increment(name, &[(CONNECTOR_TAG, self.config.identity.as_str())]);
    }
}
