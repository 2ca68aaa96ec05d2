//! Local redelivery: a small, bounded number of in-process retries.
//!
//! Each wait is an async timer, so the worker is free while a retry is
//! pending. The total wait is bounded by [`RedeliveryPolicy::total_delay`].

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ConnectorIdentity;
use crate::delivery::{DeliveryOutcome, DeliveryReport, FailureClass, OutcomeClassifier};
use crate::errors::DeliveryError;
use crate::metrics::{MetricsSink, CONNECTOR_TAG};

/// How the delay between local retries evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedeliveryBackoff {
    /// delay = base
    #[default]
    Fixed,
    /// delay = base * 2^(retry - 1)
    Doubling,
}

/// Bounds of the local retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeliveryPolicy {
    /// Retries performed after the first attempt.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Backoff between retries.
    pub backoff: RedeliveryBackoff,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(1000),
            backoff: RedeliveryBackoff::Fixed,
        }
    }
}

impl RedeliveryPolicy {
    /// Creates the default policy: 2 retries, 1s apart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RedeliveryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the total number of tries, first attempt included.
    #[must_use]
    pub fn max_tries(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Returns the delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            RedeliveryBackoff::Fixed => self.delay,
            RedeliveryBackoff::Doubling => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Returns the worst-case time spent waiting between tries.
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_attempts).fold(Duration::ZERO, |total, retry| {
            total.saturating_add(self.delay_for(retry))
        })
    }
}

/// Attempt accounting for one redelivery loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedeliveryState {
    /// Tries performed so far, first attempt included.
    pub attempts: u32,
}

impl RedeliveryState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the retries performed so far.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Returns true if no retry is left.
    #[must_use]
    pub fn is_exhausted(&self, policy: &RedeliveryPolicy) -> bool {
        self.retries() >= policy.max_attempts
    }
}

/// Result of a redelivery loop.
#[derive(Debug)]
pub enum RedeliveryOutcome {
    /// An attempt succeeded.
    Delivered {
        /// The executor's report.
        report: DeliveryReport,
        /// Tries performed, first attempt included.
        attempts: u32,
    },
    /// The loop gave up.
    Failed {
        /// The last executor error.
        error: DeliveryError,
        /// Classification of the last error. `Transient` means the retry
        /// budget is exhausted.
        class: FailureClass,
        /// Tries performed, first attempt included.
        attempts: u32,
    },
}

impl RedeliveryOutcome {
    /// Returns the number of tries performed.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Runs an operation with bounded local retries on transient failures.
#[derive(Debug, Clone)]
pub struct LocalRedeliveryController {
    policy: RedeliveryPolicy,
    classifier: Arc<dyn OutcomeClassifier>,
    metrics: Arc<dyn MetricsSink>,
    counter_name: String,
    connector: ConnectorIdentity,
}

impl LocalRedeliveryController {
    /// Creates a controller.
    #[must_use]
    pub fn new(
        connector: ConnectorIdentity,
        policy: RedeliveryPolicy,
        classifier: Arc<dyn OutcomeClassifier>,
        metrics: Arc<dyn MetricsSink>,
        counter_name: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            classifier,
            metrics,
            counter_name: counter_name.into(),
            connector,
        }
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &RedeliveryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails terminally or exhausts the
    /// retry budget. `id` is only used for logging.
    ///
    /// The redelivery counter is incremented once per retry performed.
    pub async fn run<F, Fut>(&self, id: &str, mut operation: F) -> RedeliveryOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<DeliveryReport, DeliveryError>>,
    {
        let mut state = RedeliveryState::new();

        loop {
            state.attempts += 1;
            let result = operation().await;
            let class = match self.classifier.outcome(&result) {
                DeliveryOutcome::TransientFailure => FailureClass::Transient,
                DeliveryOutcome::Success | DeliveryOutcome::TerminalFailure => {
                    FailureClass::Terminal
                }
            };
            let error = match result {
                Ok(report) => {
                    return RedeliveryOutcome::Delivered {
                        report,
                        attempts: state.attempts,
                    }
                }
                Err(error) => error,
            };

            if class == FailureClass::Terminal || state.is_exhausted(&self.policy) {
                if class == FailureClass::Transient {
                    warn!(
                        id = %id,
                        connector = %self.connector,
                        attempts = state.attempts,
                        error = %error,
                        "Local redelivery budget exhausted"
                    );
                }
                return RedeliveryOutcome::Failed {
                    error,
                    class,
                    attempts: state.attempts,
                };
            }

            let delay = self.policy.delay_for(state.attempts);
            debug!(
                id = %id,
                connector = %self.connector,
                attempt = state.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Redelivering after transient failure"
            );
            tokio::time::sleep(delay).await;
            self.metrics.increment(
                &self.counter_name,
                &[(CONNECTOR_TAG, self.connector.as_str())],
            );
        }
    }
}
