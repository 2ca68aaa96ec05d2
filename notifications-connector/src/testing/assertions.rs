//! Test assertions for outbound results and reinjected messages.

use crate::config::ConnectorIdentity;
use crate::envelope::{HistoryResult, HISTORY_RESULT_TYPE, SPEC_VERSION};
use crate::messaging::Message;

fn assert_result_shape(result: &HistoryResult) {
    assert_eq!(result.result_type, HISTORY_RESULT_TYPE, "unexpected result type");
    assert_eq!(result.specversion, SPEC_VERSION, "unexpected specversion");
}

/// Asserts that `result` reports a successful delivery of `id`.
pub fn assert_reported_success(result: &HistoryResult, id: &str) {
    assert_result_shape(result);
    assert_eq!(result.id, id, "result id does not match the inbound id");
    assert!(
        result.data.successful,
        "Expected success, got outcome: {}",
        result.data.details.outcome
    );
}

/// Asserts that `result` reports a failed delivery of `id` whose outcome
/// contains `outcome_fragment`.
pub fn assert_reported_failure(result: &HistoryResult, id: &str, outcome_fragment: &str) {
    assert_result_shape(result);
    assert_eq!(result.id, id, "result id does not match the inbound id");
    assert!(!result.data.successful, "Expected failure, got success");
    assert!(
        !result.data.details.outcome.is_empty(),
        "Expected a non-empty failure outcome"
    );
    assert!(
        result.data.details.outcome.contains(outcome_fragment),
        "Expected outcome to contain '{}', got '{}'",
        outcome_fragment,
        result.data.details.outcome
    );
}

/// Asserts that `message` is a reinjection of `original` by `identity`
/// carrying `expected_count`.
pub fn assert_reinjected(
    message: &Message,
    original: &Message,
    identity: ConnectorIdentity,
    expected_count: u32,
) {
    assert_eq!(message.body, original.body, "reinjected body was modified");
    assert_eq!(
        message.headers.connector_type(),
        Some(identity.as_str()),
        "reinjected message must carry the connector identity"
    );
    assert_eq!(
        message.headers.reinjection_count(),
        expected_count,
        "unexpected reinjection count"
    );
    assert_eq!(
        message.headers.payload_reference(),
        original.headers.payload_reference(),
        "payload reference was not forwarded"
    );
}
