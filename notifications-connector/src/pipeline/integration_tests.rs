//! End-to-end scenarios through the pipeline, the in-memory broker and the
//! runtime.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use super::{ConnectorRuntime, Disposition};
use crate::config::{ConnectorConfig, ConnectorIdentity, FailureAction};
use crate::errors::DeliveryError;
use crate::messaging::{Message, MessagePublisher};
use crate::metrics::{MESSAGES_FAILED, MESSAGES_PROCESSED, MESSAGES_REINJECTED, MESSAGES_SUCCEEDED};
use crate::testing::{
    assert_reinjected, assert_reported_failure, assert_reported_success, EnvelopeFixture,
    ScriptedExecutor, TestConnector,
};

fn slack() -> ConnectorConfig {
    ConnectorConfig::new(ConnectorIdentity::Slack)
}

fn timeouts() -> ScriptedExecutor {
    ScriptedExecutor::always_failing(|| DeliveryError::timeout("target did not answer"))
}

#[tokio::test(start_paused = true)]
async fn test_only_addressed_messages_are_processed() {
    let connector = TestConnector::new(slack(), ScriptedExecutor::new()).unwrap();

    let accepted = EnvelopeFixture::new(ConnectorIdentity::Slack).with_id("for-slack");
    let rejected = EnvelopeFixture::new(ConnectorIdentity::Teams).with_id("for-teams");

    let disposition = connector.pipeline.process(accepted.to_message()).await.unwrap();
    assert!(matches!(disposition, Disposition::Reported { successful: true, .. }));
    let disposition = connector.pipeline.process(rejected.to_message()).await.unwrap();
    assert_eq!(disposition, Disposition::Filtered);

    assert_eq!(connector.executor.called_ids(), vec!["for-slack"]);
    assert_eq!(connector.outbound_results().len(), 1);
    assert_eq!(connector.counter(MESSAGES_PROCESSED), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_identity_header_is_filtered() {
    let connector = TestConnector::new(slack(), ScriptedExecutor::new()).unwrap();
    let message = EnvelopeFixture::new(ConnectorIdentity::Slack)
        .with_connector_type(None)
        .to_message();

    let disposition = connector.pipeline.process(message).await.unwrap();

    assert_eq!(disposition, Disposition::Filtered);
    assert_eq!(connector.executor.call_count(), 0);
    assert!(connector.broker.published(&connector.config().outbound_topic).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_are_reported_when_configured() {
    let config = slack().with_on_exhaustion(FailureAction::Report);
    let connector = TestConnector::new(config, timeouts()).unwrap();
    let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack).with_id("e-1");

    let disposition = connector.pipeline.process(fixture.to_message()).await.unwrap();

    assert_eq!(
        disposition,
        Disposition::Reported {
            id: "e-1".to_string(),
            successful: false
        }
    );
    assert_eq!(connector.executor.call_count(), 3);
    assert_eq!(connector.redeliveries(), 2);

    let results = connector.outbound_results();
    assert_eq!(results.len(), 1);
    assert_reported_failure(&results[0], "e-1", "timed out");
    assert!(connector.reinjected().is_empty());
    assert_eq!(connector.counter(MESSAGES_FAILED), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_are_reinjected_by_default() {
    let connector = TestConnector::new(slack(), timeouts()).unwrap();
    let original = EnvelopeFixture::new(ConnectorIdentity::Slack)
        .with_id("e-2")
        .with_payload_reference("payload-2");
    let message = original.to_message();

    let disposition = connector.pipeline.process(message.clone()).await.unwrap();

    assert_eq!(
        disposition,
        Disposition::Reinjected {
            id: "e-2".to_string(),
            count: 1,
            delay: Duration::from_secs(10),
        }
    );
    assert!(connector.outbound_results().is_empty());
    assert_eq!(connector.counter(MESSAGES_REINJECTED), 1);

    tokio::time::sleep(Duration::from_millis(9_900)).await;
    assert!(connector.reinjected().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let reinjected = connector.reinjected();
    assert_eq!(reinjected.len(), 1);
    assert_reinjected(&reinjected[0], &message, ConnectorIdentity::Slack, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reinjection_delay_grows_with_count() {
    let connector = TestConnector::new(slack(), timeouts()).unwrap();

    let expected = [(1, 30), (2, 60), (3, 150)];
    for (count, secs) in expected {
        let message = EnvelopeFixture::new(ConnectorIdentity::Slack)
            .with_reinjection_count(count)
            .to_message();
        let disposition = connector.pipeline.process(message).await.unwrap();
        match disposition {
            Disposition::Reinjected { count: next, delay, .. } => {
                assert_eq!(next, count + 1);
                assert_eq!(delay, Duration::from_secs(secs));
            }
            other => panic!("expected a reinjection, got {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_reinjection_cap_reports_failure() {
    let config = slack().with_max_reinjections(2);
    let connector = TestConnector::new(config, timeouts()).unwrap();

    let below_cap = EnvelopeFixture::new(ConnectorIdentity::Slack).with_reinjection_count(1);
    let at_cap = EnvelopeFixture::new(ConnectorIdentity::Slack)
        .with_id("capped")
        .with_reinjection_count(2);

    let disposition = connector.pipeline.process(below_cap.to_message()).await.unwrap();
    assert!(matches!(disposition, Disposition::Reinjected { count: 2, .. }));

    let disposition = connector.pipeline.process(at_cap.to_message()).await.unwrap();
    assert!(matches!(disposition, Disposition::Reported { successful: false, .. }));

    let results = connector.outbound_results();
    assert_eq!(results.len(), 1);
    assert_reported_failure(&results[0], "capped", "timed out");
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_is_reported_without_retry() {
    let executor = ScriptedExecutor::new().then_fail(DeliveryError::http(404, "no such hook"));
    let connector = TestConnector::new(slack(), executor).unwrap();
    let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack).with_id("e-404");

    connector.pipeline.process(fixture.to_message()).await.unwrap();

    assert_eq!(connector.executor.call_count(), 1);
    assert_eq!(connector.redeliveries(), 0);
    assert!(connector.reinjected().is_empty());
    let results = connector.outbound_results();
    assert_reported_failure(&results[0], "e-404", "404");
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_can_be_reinjected() {
    let executor = ScriptedExecutor::always_failing(|| DeliveryError::http(500, "oops"));
    let config = slack().with_on_terminal_failure(FailureAction::Reinject);
    let connector = TestConnector::new(config, executor).unwrap();

    let disposition = connector
        .pipeline
        .process(EnvelopeFixture::new(ConnectorIdentity::Slack).to_message())
        .await
        .unwrap();

    assert!(matches!(disposition, Disposition::Reinjected { count: 1, .. }));
    assert_eq!(connector.executor.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_is_reported_without_delivery() {
    let connector = TestConnector::new(slack(), ScriptedExecutor::new()).unwrap();
    let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack);

    connector
        .pipeline
        .process(fixture.message_with_body("not json at all"))
        .await
        .unwrap();
    connector
        .pipeline
        .process(fixture.message_with_body(r#"{"id": "e-salvaged"}"#))
        .await
        .unwrap();

    assert_eq!(connector.executor.call_count(), 0);
    assert!(connector.reinjected().is_empty());
    let results = connector.outbound_results();
    assert_eq!(results.len(), 2);
    assert_reported_failure(&results[0], "unknown", "Decode error");
    assert_reported_failure(&results[1], "e-salvaged", "Decode error");
}

#[tokio::test(start_paused = true)]
async fn test_success_on_first_try() {
    let executor = ScriptedExecutor::new().with_latency(Duration::from_millis(25));
    let connector = TestConnector::new(slack(), executor).unwrap();
    let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack)
        .with_id("e-ok")
        .with_target_url("https://hooks.slack.example/T000");

    connector.pipeline.process(fixture.to_message()).await.unwrap();

    let results = connector.outbound_results();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_reported_success(result, "e-ok");
    assert_eq!(result.data.details.outcome, "Event sent successfully");
    assert_eq!(result.source, "slack");
    assert_eq!(
        result.data.details.target.as_deref(),
        Some("https://hooks.slack.example/T000")
    );
    assert!(result.data.duration >= 25);
    assert_eq!(connector.redeliveries(), 0);
    assert_eq!(connector.counter(MESSAGES_SUCCEEDED), 1);
}

#[tokio::test(start_paused = true)]
async fn test_instant_success_reports_positive_duration() {
    let connector = TestConnector::new(slack(), ScriptedExecutor::new()).unwrap();
    let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack).with_id("e-fast");

    connector.pipeline.process(fixture.to_message()).await.unwrap();

    let results = connector.outbound_results();
    assert_reported_success(&results[0], "e-fast");
    assert!(results[0].data.duration > 0);
}

#[tokio::test(start_paused = true)]
async fn test_success_after_local_retry() {
    let executor = ScriptedExecutor::new()
        .then_fail(DeliveryError::connection("connection reset"))
        .then_succeed("Delivered on retry");
    let connector = TestConnector::new(slack(), executor).unwrap();
    let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack).with_id("e-retry");

    connector.pipeline.process(fixture.to_message()).await.unwrap();

    assert_eq!(connector.executor.call_count(), 2);
    assert_eq!(connector.redeliveries(), 1);
    let results = connector.outbound_results();
    assert_reported_success(&results[0], "e-retry");
    assert_eq!(results[0].data.details.outcome, "Delivered on retry");
    assert!(results[0].data.duration >= 1_000);
}

#[tokio::test(start_paused = true)]
async fn test_outbound_id_matches_inbound_id() {
    let connector = TestConnector::new(slack(), ScriptedExecutor::new()).unwrap();

    for id in ["a-1", "b-2", "c-3"] {
        let message = EnvelopeFixture::new(ConnectorIdentity::Slack).with_id(id).to_message();
        connector.pipeline.process(message).await.unwrap();
    }

    let ids: Vec<String> = connector
        .outbound_results()
        .into_iter()
        .map(|result| result.id)
        .collect();
    assert_eq!(ids, vec!["a-1", "b-2", "c-3"]);
}

#[tokio::test(start_paused = true)]
async fn test_string_encoded_data_is_delivered() {
    let connector = TestConnector::new(slack(), ScriptedExecutor::new()).unwrap();
    let fixture = EnvelopeFixture::new(ConnectorIdentity::Slack)
        .with_org_id("org-str")
        .with_target_url("https://hooks.example.com/str")
        .with_string_data();

    connector.pipeline.process(fixture.to_message()).await.unwrap();

    let payloads = connector.executor.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["org_id"], "org-str");
    assert_eq!(
        connector.outbound_results()[0].data.details.target.as_deref(),
        Some("https://hooks.example.com/str")
    );
}

#[tokio::test(start_paused = true)]
async fn test_reinjection_loop_through_broker() {
    // One full local cycle fails, the reinjected copy succeeds
    let executor = ScriptedExecutor::new()
        .then_fail(DeliveryError::timeout("slow"))
        .then_fail(DeliveryError::timeout("slow"))
        .then_fail(DeliveryError::timeout("slow"));
    let connector = TestConnector::new(slack(), executor).unwrap();
    let inbound_topic = connector.config().inbound_topic.clone();
    let inbound = connector.broker.subscribe(&inbound_topic);

    let runtime = ConnectorRuntime::new(Arc::clone(&connector.pipeline));
    let shutdown = runtime.shutdown_token();
    let handle = tokio::spawn(async move { runtime.run(inbound).await });

    let original = EnvelopeFixture::new(ConnectorIdentity::Slack).with_id("e-loop");
    let seed: Message = original.to_message();
    connector
        .broker
        .publish(&inbound_topic, seed.clone())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    shutdown.cancel();
    let stats = handle.await.unwrap();

    assert_eq!(stats.received, 2);
    assert_eq!(stats.reinjected, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(connector.executor.called_ids(), vec!["e-loop"; 4]);

    let inbound_history = connector.broker.published(&inbound_topic);
    assert_eq!(inbound_history.len(), 2);
    assert_reinjected(&inbound_history[1], &seed, ConnectorIdentity::Slack, 1);

    let results = connector.outbound_results();
    assert_eq!(results.len(), 1);
    assert_reported_success(&results[0], "e-loop");
}
