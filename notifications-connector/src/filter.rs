//! Inbound message filter.

use std::collections::BTreeSet;
use tracing::trace;

use crate::config::{ConnectorConfig, ConnectorIdentity};
use crate::messaging::Headers;

/// Accepts messages whose `connector-type` header names an accepted
/// connector identity.
///
/// A missing header or a value that is not a known identity is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFilter {
    accepted: BTreeSet<ConnectorIdentity>,
}

impl InboundFilter {
    /// Creates a filter accepting only `identity`.
    #[must_use]
    pub fn new(identity: ConnectorIdentity) -> Self {
        Self {
            accepted: BTreeSet::from([identity]),
        }
    }

    /// Creates a filter accepting every identity in `accepted`.
    #[must_use]
    pub fn with_accepted(accepted: impl IntoIterator<Item = ConnectorIdentity>) -> Self {
        Self {
            accepted: accepted.into_iter().collect(),
        }
    }

    /// Creates the filter described by a configuration.
    #[must_use]
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            accepted: config.accepted_identities(),
        }
    }

    /// Returns the accepted identities.
    #[must_use]
    pub fn accepted(&self) -> &BTreeSet<ConnectorIdentity> {
        &self.accepted
    }

    /// Returns true if the message should be processed.
    #[must_use]
    pub fn accepts(&self, headers: &Headers) -> bool {
        let accepted = Self::identity_of(headers).is_some_and(|id| self.accepted.contains(&id));
        if !accepted {
            trace!(header = ?headers.connector_type(), "Message not addressed to this connector");
        }
        accepted
    }

    /// Parses the identity named by the `connector-type` header.
    #[must_use]
    pub fn identity_of(headers: &Headers) -> Option<ConnectorIdentity> {
        headers.connector_type()?.parse().ok()
    }
}
