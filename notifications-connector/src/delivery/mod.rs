//! Delivery boundary: the connector-specific executor and the classifier
//! deciding whether a failed delivery is worth retrying.

mod classifier;
mod executor;
#[cfg(feature = "webhook")]
mod webhook;

pub use classifier::{
    DefaultClassifier, DeliveryOutcome, FailureClass, FnClassifier, HttpStatusClassifier,
    OutcomeClassifier, DEFAULT_TRANSIENT_STATUSES,
};
pub use executor::{
    endpoint_url, DeliveryExecutor, DeliveryReport, FnExecutor, SUCCESS_OUTCOME,
};
#[cfg(feature = "webhook")]
pub use webhook::{WebhookExecutor, DEFAULT_WEBHOOK_TIMEOUT};
