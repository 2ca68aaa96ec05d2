//! Testing utilities for connectors built on this pipeline.
//!
//! This module provides:
//! - A scripted delivery executor
//! - Envelope fixtures and an in-memory connector harness
//! - Assertions over outbound results and reinjected messages

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_reinjected, assert_reported_failure, assert_reported_success,
};
pub use fixtures::{EnvelopeFixture, TestConnector};
pub use mocks::ScriptedExecutor;
