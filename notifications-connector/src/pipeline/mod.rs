//! The connector delivery pipeline.
//!
//! - [`redelivery`]: bounded local retries
//! - [`reinjection`]: delayed republishing to the inbound topic
//! - [`processor`]: the per-message pipeline tying both together
//! - [`runtime`]: the batching consumer loop

pub mod processor;
pub mod redelivery;
pub mod reinjection;
pub mod runtime;

#[cfg(test)]
mod integration_tests;

pub use processor::{ConnectorPipeline, ConnectorPipelineBuilder, Disposition};
pub use redelivery::{
    LocalRedeliveryController, RedeliveryBackoff, RedeliveryOutcome, RedeliveryPolicy,
    RedeliveryState,
};
pub use reinjection::{
    reinjection_delay, ReinjectionController, ReinjectionPolicy, ScheduledReinjection,
};
pub use runtime::{ConnectorRuntime, RuntimeStats};
