//! # Notifications Connector
//!
//! The delivery pipeline shared by every notification connector.
//!
//! A connector consumes event envelopes from an inbound topic, hands them to
//! a connector-specific [`DeliveryExecutor`](delivery::DeliveryExecutor) and
//! reports the outcome to the engine on an outbound topic. Failures go
//! through two retry tiers:
//!
//! - **Local redelivery**: a small, bounded number of in-process retries
//!   with a fixed (or doubling) delay.
//! - **Reinjection**: the original envelope is republished to the inbound
//!   topic after a staged delay, so slow back-ends never hold the consumer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use notifications_connector::prelude::*;
//! use std::sync::Arc;
//!
//! let config = ConnectorConfig::from_env()?;
//! let broker = Arc::new(InMemoryBroker::new());
//! let pipeline = ConnectorPipeline::builder(config)
//!     .executor(Arc::new(WebhookExecutor::new()?))
//!     .publisher(broker.clone())
//!     .metrics(Arc::new(LoggingMetricsSink::default()))
//!     .build()?;
//!
//! let disposition = pipeline.process(message).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod delivery;
pub mod envelope;
pub mod errors;
pub mod filter;
pub mod messaging;
pub mod metrics;
pub mod payload;
pub mod pipeline;
pub mod telemetry;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ConnectorConfig, ConnectorIdentity, FailureAction};
    pub use crate::context::ProcessingContext;
    pub use crate::delivery::{
        DefaultClassifier, DeliveryExecutor, DeliveryReport, FailureClass,
        FnExecutor, HttpStatusClassifier, OutcomeClassifier,
    };
    #[cfg(feature = "webhook")]
    pub use crate::delivery::WebhookExecutor;
    pub use crate::envelope::{decode, Envelope, HistoryResult, OutboundResultBuilder};
    pub use crate::errors::{
        ConfigError, ConnectorError, DecodeError, DeliveryError, PayloadError,
        PublishError, ReinjectionPublishError,
    };
    pub use crate::filter::InboundFilter;
    pub use crate::messaging::{Headers, InMemoryBroker, Message, MessagePublisher};
    pub use crate::metrics::{
        InMemoryMetrics, LoggingMetricsSink, MetricsSink, NoOpMetricsSink,
    };
    pub use crate::payload::{InMemoryPayloadStore, PayloadStore};
    pub use crate::pipeline::{
        reinjection_delay, ConnectorPipeline, ConnectorRuntime, Disposition,
        LocalRedeliveryController, RedeliveryBackoff, RedeliveryPolicy,
        ReinjectionController, ReinjectionPolicy,
    };
    pub use crate::telemetry::{init_tracing, LogFormat, TelemetryConfig};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
