//! Metrics sink trait and implementations.

use std::fmt::Debug;
use tracing::{debug, info, Level};

/// Receives counter increments.
///
/// Implementations must be safe to call from many tasks at once.
pub trait MetricsSink: Send + Sync + Debug {
    /// Increments the counter `name` with the given tags by one.
    fn increment(&self, name: &str, tags: &[(&str, &str)]);
}

/// A sink that discards every increment.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn increment(&self, _name: &str, _tags: &[(&str, &str)]) {}
}

/// A sink that logs every increment using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingMetricsSink {
    level: Level,
}

impl Default for LoggingMetricsSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingMetricsSink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl MetricsSink for LoggingMetricsSink {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        if self.level == Level::INFO {
            info!(metric = %name, tags = ?tags, "Counter incremented");
        } else {
            debug!(metric = %name, tags = ?tags, "Counter incremented");
        }
    }
}
