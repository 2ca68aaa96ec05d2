//! Mock executors for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::ProcessingContext;
use crate::delivery::{DeliveryExecutor, DeliveryReport};
use crate::errors::DeliveryError;

type ErrorFactory = Arc<dyn Fn() -> DeliveryError + Send + Sync>;

/// An executor replaying scripted results, then a fallback.
///
/// The fallback is success unless [`ScriptedExecutor::always_failing`] or
/// [`ScriptedExecutor::fail_by_default`] is used.
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<DeliveryReport, DeliveryError>>>,
    fallback_error: Option<ErrorFactory>,
    latency: Option<Duration>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl fmt::Debug for ScriptedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedExecutor")
            .field("scripted", &self.script.lock().len())
            .field("fails_by_default", &self.fallback_error.is_some())
            .field("latency", &self.latency)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback_error: None,
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedExecutor {
    /// Creates an executor that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor failing every call with the error built by `make`.
    #[must_use]
    pub fn always_failing(make: impl Fn() -> DeliveryError + Send + Sync + 'static) -> Self {
        Self::new().fail_by_default(make)
    }

    /// Fails with `make()` once the script is consumed.
    #[must_use]
    pub fn fail_by_default(mut self, make: impl Fn() -> DeliveryError + Send + Sync + 'static) -> Self {
        self.fallback_error = Some(Arc::new(make));
        self
    }

    /// Appends a success to the script.
    #[must_use]
    pub fn then_succeed(self, outcome: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(DeliveryReport::new(outcome)));
        self
    }

    /// Appends a failure to the script.
    #[must_use]
    pub fn then_fail(self, error: DeliveryError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Waits `latency` before answering each call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the context ids of every call.
    #[must_use]
    pub fn called_ids(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Returns the payloads of every call.
    #[must_use]
    pub fn payloads(&self) -> Vec<Value> {
        self.calls.lock().iter().map(|(_, payload)| payload.clone()).collect()
    }

    fn next_result(&self) -> Result<DeliveryReport, DeliveryError> {
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        match &self.fallback_error {
            Some(make) => Err(make()),
            None => Ok(DeliveryReport::default()),
        }
    }
}

#[async_trait]
impl DeliveryExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        ctx: &ProcessingContext,
        payload: &Value,
    ) -> Result<DeliveryReport, DeliveryError> {
        self.calls.lock().push((ctx.id.clone(), payload.clone()));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_result()
    }
}
