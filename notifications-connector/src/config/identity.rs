//! Connector identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The set of connectors that can run this pipeline.
///
/// The string form is the value carried by the `connector-type` header and
/// the `source` of every outbound result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConnectorIdentity {
    /// Generic HTTP webhook.
    #[serde(rename = "webhook")]
    Webhook,
    /// Slack incoming webhooks.
    #[serde(rename = "slack")]
    Slack,
    /// Microsoft Teams.
    #[serde(rename = "teams")]
    Teams,
    /// Google Chat.
    #[serde(rename = "google_chat")]
    GoogleChat,
    /// PagerDuty events API.
    #[serde(rename = "pagerduty")]
    PagerDuty,
    /// ServiceNow ITSM.
    #[serde(rename = "servicenow")]
    ServiceNow,
    /// Splunk HTTP event collector.
    #[serde(rename = "splunk")]
    Splunk,
    /// Email relay.
    #[serde(rename = "email_subscription")]
    Email,
    /// In-console notification drawer.
    #[serde(rename = "drawer")]
    Drawer,
}

impl ConnectorIdentity {
    /// All supported identities.
    pub const ALL: [Self; 9] = [
        Self::Webhook,
        Self::Slack,
        Self::Teams,
        Self::GoogleChat,
        Self::PagerDuty,
        Self::ServiceNow,
        Self::Splunk,
        Self::Email,
        Self::Drawer,
    ];

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Slack => "slack",
            Self::Teams => "teams",
            Self::GoogleChat => "google_chat",
            Self::PagerDuty => "pagerduty",
            Self::ServiceNow => "servicenow",
            Self::Splunk => "splunk",
            Self::Email => "email_subscription",
            Self::Drawer => "drawer",
        }
    }
}

impl fmt::Display for ConnectorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known connector identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown connector identity: '{0}'")]
pub struct UnknownIdentity(pub String);

impl FromStr for ConnectorIdentity {
    type Err = UnknownIdentity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|identity| identity.as_str() == s)
            .ok_or_else(|| UnknownIdentity(s.to_string()))
    }
}
