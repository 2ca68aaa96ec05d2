//! Messages, headers and the publisher seam.
//!
//! The pipeline never talks to a broker directly: results and reinjected
//! envelopes go through a [`MessagePublisher`], and inbound records arrive
//! as [`Message`] values.

mod memory;
mod message;
mod publisher;

pub use memory::InMemoryBroker;
pub use message::{
    Headers, Message, CONNECTOR_TYPE_HEADER, PAYLOAD_REFERENCE_HEADER, REINJECTION_COUNT_HEADER,
};
#[cfg(test)]
pub use publisher::MockMessagePublisher;
pub use publisher::MessagePublisher;
