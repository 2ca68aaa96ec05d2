//! Consumer loop driving a [`ConnectorPipeline`].

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::processor::{ConnectorPipeline, Disposition};
use crate::messaging::Message;

/// Counters of one runtime session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Records pulled from the inbound channel.
    pub received: u64,
    /// Records addressed to another connector.
    pub filtered: u64,
    /// Records reported to the engine as successful.
    pub succeeded: u64,
    /// Records reported to the engine as failed.
    pub failed: u64,
    /// Records handed to the reinjection tier.
    pub reinjected: u64,
    /// Records whose processing returned an error.
    pub errors: u64,
}

impl RuntimeStats {
    fn record(&mut self, result: &Result<Disposition, crate::errors::ConnectorError>) {
        match result {
            Ok(Disposition::Filtered) => self.filtered += 1,
            Ok(Disposition::Reported { successful: true, .. }) => self.succeeded += 1,
            Ok(Disposition::Reported { successful: false, .. }) => self.failed += 1,
            Ok(Disposition::Reinjected { .. }) => self.reinjected += 1,
            Err(_) => self.errors += 1,
        }
    }
}

/// Pulls inbound records in batches and processes them concurrently.
///
/// Batches hold at most `max_poll_records` records and at most
/// `consumer_concurrency` records are processed at once. A batch is fully
/// processed before the next one is pulled.
#[derive(Debug)]
pub struct ConnectorRuntime {
    pipeline: Arc<ConnectorPipeline>,
    shutdown: CancellationToken,
}

impl ConnectorRuntime {
    /// Creates a runtime for `pipeline`.
    #[must_use]
    pub fn new(pipeline: Arc<ConnectorPipeline>) -> Self {
        Self {
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a token that stops the runtime when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops pulling new records.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs until shutdown is requested or `inbound` is closed.
    ///
    /// In-flight records are always finished, then pending reinjections are
    /// published without waiting out their delay.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Message>) -> RuntimeStats {
        let config = self.pipeline.config();
        let batch_size = config.max_poll_records;
        let permits = Arc::new(Semaphore::new(config.consumer_concurrency));
        let mut stats = RuntimeStats::default();
        let mut batch = Vec::with_capacity(batch_size);

        info!(
            connector = %config.identity,
            topic = %config.inbound_topic,
            group_id = %config.consumer_group_id(),
            batch_size,
            concurrency = config.consumer_concurrency,
            "Connector runtime started"
        );
        config.log_configuration();

        loop {
            let received = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                received = inbound.recv_many(&mut batch, batch_size) => received,
            };
            if received == 0 {
                break;
            }
            stats.received += received as u64;

            let mut tasks = JoinSet::new();
            for message in batch.drain(..) {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let pipeline = Arc::clone(&self.pipeline);
                tasks.spawn(async move {
                    let _permit = permit;
                    pipeline.process(message).await
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => {
                        if let Err(err) = &result {
                            error!(error = %err, "Failed to process record");
                        }
                        stats.record(&result);
                    }
                    Err(err) => {
                        error!(error = %err, "Record processing task panicked");
                        stats.errors += 1;
                    }
                }
            }
        }

        let pending = self.pipeline.reinjection().pending_count();
        if pending > 0 {
            warn!(pending, "Flushing pending reinjections before shutdown");
        }
        self.pipeline.reinjection().flush();
        self.pipeline.reinjection().wait_for_pending().await;

        info!(
            received = stats.received,
            succeeded = stats.succeeded,
            failed = stats.failed,
            reinjected = stats.reinjected,
            errors = stats.errors,
            "Connector runtime stopped"
        );
        stats
    }
}
