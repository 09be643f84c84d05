//! Channel conformance suite, shared through crosswire-testkit.

use crosswire_testkit::bidirectional::{BidirectionalScenario, run_bidirectional_scenario};
use crosswire_testkit::properties;

#[tokio::test]
async fn correlation_storm() {
    properties::run_correlation_storm(64).await.unwrap();
}

#[tokio::test]
async fn timeout_fires_deterministically() {
    properties::run_timeout_fires().await.unwrap();
}

#[tokio::test]
async fn cancellation_does_not_affect_siblings() {
    properties::run_cancel_leaves_sibling().await.unwrap();
}

#[tokio::test]
async fn disposal_fails_all_outstanding_calls() {
    properties::run_disposal_fails_all(16).await.unwrap();
}

#[tokio::test]
async fn late_response_is_dropped() {
    properties::run_late_response_is_dropped().await.unwrap();
}

#[tokio::test]
async fn unknown_cancellation_is_ignored() {
    properties::run_unknown_cancellation_is_ignored()
        .await
        .unwrap();
}

#[tokio::test]
async fn callback_round_trip() {
    properties::run_callback_round_trip().await.unwrap();
}

#[tokio::test]
async fn unknown_targets_answer_with_errors() {
    properties::run_unknown_targets_answer_with_errors()
        .await
        .unwrap();
}

#[tokio::test]
async fn bidirectional_simple_echo() {
    run_bidirectional_scenario(BidirectionalScenario::SimpleEcho).await;
}

#[tokio::test]
async fn bidirectional_nested_callback() {
    run_bidirectional_scenario(BidirectionalScenario::NestedCallback).await;
}

#[tokio::test]
async fn bidirectional_multiple_nested_callbacks() {
    run_bidirectional_scenario(BidirectionalScenario::MultipleNestedCallbacks).await;
}
