//! Named-counter metrics.
//!
//! The pipeline only ever increments counters; exporting them is left to
//! the [`MetricsSink`] implementation.

mod memory;
mod sink;

pub use memory::InMemoryMetrics;
pub use sink::{LoggingMetricsSink, MetricsSink, NoOpMetricsSink};

/// Tag naming the connector on every counter.
pub const CONNECTOR_TAG: &str = "connector";

/// Processing contexts created, decode failures included.
pub const MESSAGES_PROCESSED: &str = "connector.messages.processed";

/// Successful outbound reports.
pub const MESSAGES_SUCCEEDED: &str = "connector.messages.succeeded";

/// Failed outbound reports.
pub const MESSAGES_FAILED: &str = "connector.messages.failed";

/// Reinjections scheduled.
pub const MESSAGES_REINJECTED: &str = "connector.messages.reinjected";

/// Reinjected messages lost because the republish failed.
pub const REINJECTION_FAILED: &str = "connector.reinjection.failed";
