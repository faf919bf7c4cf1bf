//! End-to-end workflow runs against the in-memory gateways

mod fixtures;

use fixtures::{fast_settings, TestGateways};
use rider_state::gateways::{Gateway, GatewayError, StoreOperation};
use rider_state::lifecycle::{RawTransitionRequest, Stage, StateName, TransitionOutcome};
use serde_json::json;
use std::time::Duration;

fn request(entity_id: &str, next_state: StateName) -> RawTransitionRequest {
    RawTransitionRequest::new(entity_id, next_state.as_str())
}

#[tokio::test(start_paused = true)]
async fn test_full_shift_lifecycle() {
    let fixture = TestGateways::new();
    fixture.seed_at("rider-7", StateName::NotWorking, 52.52, 13.40);
    let orchestrator = fixture.orchestrator();

    for next in [
        StateName::Available,
        StateName::Starting,
        StateName::Working,
        StateName::NotWorking,
    ] {
        let outcome = orchestrator.run(request("rider-7", next)).await;
        assert!(outcome.is_success(), "moving to {next} failed: {outcome:?}");
        assert_eq!(fixture.state_of("rider-7"), Some(next));
    }

    // Starting -> Working is validated and publishes nothing
    let events = fixture.notifier.events();
    let published: Vec<(StateName, StateName)> = events
        .iter()
        .map(|event| (event.from_state, event.to_state))
        .collect();
    assert_eq!(
        published,
        vec![
            (StateName::NotWorking, StateName::Available),
            (StateName::Available, StateName::Starting),
            (StateName::Working, StateName::NotWorking),
        ]
    );
    assert!(fixture.dead_letter.envelopes().is_empty());

    let stats = orchestrator.metrics().get_stats();
    assert_eq!(stats.requests, 4);
    assert_eq!(stats.succeeded, 4);
    assert_eq!(stats.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_blocked_outside_service_area() {
    let fixture = TestGateways::new();
    fixture.seed_at("rider-1", StateName::Starting, -33.86, 151.21);

    let outcome = fixture
        .orchestrator()
        .run(request("rider-1", StateName::Working))
        .await;

    assert_eq!(outcome.stage(), Some(Stage::Precondition));
    assert_eq!(fixture.state_of("rider-1"), Some(StateName::Starting));

    let envelopes = fixture.dead_letter.envelopes();
    assert_eq!(envelopes.len(), 1);
    let verdict = envelopes[0].context.validator.clone().unwrap();
    assert!(!verdict.valid);
}

#[tokio::test(start_paused = true)]
async fn test_rider_without_location_cannot_start_work() {
    let fixture = TestGateways::new();
    fixture.seed("rider-2", StateName::Starting);

    let outcome = fixture
        .orchestrator()
        .run(request("rider-2", StateName::Working))
        .await;

    match outcome {
        TransitionOutcome::FailedDeadLettered { stage, cause, .. } => {
            assert_eq!(stage, Stage::Precondition);
            assert!(cause.contains("no known location"));
        }
        other => panic!("Expected precondition failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_store_failures_are_absorbed() {
    let fixture = TestGateways::new();
    fixture.seed("rider-3", StateName::Available);
    fixture.store.fail_next(
        StoreOperation::Get,
        [
            GatewayError::unavailable(Gateway::StateStore, "connection reset"),
            GatewayError::Throttled {
                gateway: Gateway::StateStore,
            },
        ],
    );
    fixture.store.fail_next(
        StoreOperation::Update,
        [GatewayError::Timeout {
            gateway: Gateway::StateStore,
            timeout_ms: 500,
        }],
    );

    let orchestrator = fixture.orchestrator();
    let started = tokio::time::Instant::now();
    let outcome = orchestrator
        .run(request("rider-3", StateName::NotWorking))
        .await;

    assert!(outcome.is_success());
    assert_eq!(fixture.store.call_count(StoreOperation::Get), 3);
    assert_eq!(fixture.store.call_count(StoreOperation::Update), 2);
    assert_eq!(orchestrator.metrics().get_stats().retries, 3);
    // fetch: 1s + 1.5s, persist: 1s
    assert_eq!(started.elapsed(), Duration::from_millis(3500));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_update_is_not_retried() {
    let fixture = TestGateways::new();
    fixture.seed("rider-4", StateName::Available);
    fixture.store.fail_always(
        StoreOperation::Update,
        GatewayError::rejected(Gateway::StateStore, "conditional check failed"),
    );

    let outcome = fixture
        .orchestrator()
        .run(request("rider-4", StateName::Starting))
        .await;

    assert_eq!(outcome.stage(), Some(Stage::Persist));
    assert_eq!(fixture.store.call_count(StoreOperation::Update), 1);
    assert!(fixture.notifier.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notify_exhaustion_leaves_state_persisted() {
    let fixture = TestGateways::new();
    fixture.seed("rider-5", StateName::Working);
    fixture
        .notifier
        .fail_always(GatewayError::unavailable(Gateway::Notifier, "broker down"));

    let outcome = fixture
        .orchestrator()
        .run(request("rider-5", StateName::NotWorking))
        .await;

    assert_eq!(outcome.stage(), Some(Stage::Notify));
    assert_eq!(fixture.notifier.attempts(), 5);
    assert_eq!(fixture.state_of("rider-5"), Some(StateName::NotWorking));

    let envelope = &fixture.dead_letter.envelopes()[0];
    assert!(envelope.context.persisted);
    assert!(!envelope.context.notified);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_outage_is_reported_not_raised() {
    let fixture = TestGateways::new();
    fixture.seed("rider-6", StateName::Working);
    fixture
        .dead_letter
        .fail_always(GatewayError::unavailable(Gateway::DeadLetter, "queue offline"));

    let outcome = fixture
        .orchestrator()
        .run(request("rider-6", StateName::Available))
        .await;

    assert!(matches!(
        outcome,
        TransitionOutcome::FailedDeadLettered {
            stage: Stage::Classify,
            dead_lettered: false,
            ..
        }
    ));
    assert_eq!(fixture.dead_letter.attempts(), 5);
}

#[tokio::test]
async fn test_json_payload_with_rider_id_alias() {
    let fixture = TestGateways::new();
    fixture.seed("rider-8", StateName::Available);

    let outcome = fixture
        .orchestrator_with(fast_settings())
        .run_value(json!({"rider_id": "rider-8", "next_state": "Not Working"}))
        .await;

    assert_eq!(
        outcome,
        TransitionOutcome::Succeeded {
            entity_id: "rider-8".to_string(),
            from_state: StateName::Available,
            to_state: StateName::NotWorking,
        }
    );
}

#[tokio::test]
async fn test_illegal_request_envelope_keeps_original_payload() {
    let fixture = TestGateways::new();
    fixture.seed("rider-9", StateName::NotWorking);

    let raw = RawTransitionRequest::new("rider-9", "Working");
    let outcome = fixture
        .orchestrator_with(fast_settings())
        .run(raw.clone())
        .await;

    assert_eq!(outcome.stage(), Some(Stage::Classify));
    let envelopes = fixture.dead_letter.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].original_request(), &raw);
    assert_eq!(
        envelopes[0].context.rider.as_ref().map(|r| r.current_state),
        Some(StateName::NotWorking)
    );
}

#[tokio::test]
async fn test_concurrent_runs_for_distinct_riders() {
    let fixture = TestGateways::new();
    let riders: Vec<String> = (0..20).map(|i| format!("rider-{i}")).collect();
    for rider in &riders {
        fixture.seed(rider, StateName::NotWorking);
    }
    let orchestrator = fixture.orchestrator_with(fast_settings());

    let outcomes = futures::future::join_all(
        riders
            .iter()
            .map(|rider| orchestrator.run(request(rider, StateName::Available))),
    )
    .await;

    assert!(outcomes.iter().all(TransitionOutcome::is_success));
    assert_eq!(fixture.notifier.events().len(), riders.len());
    for rider in &riders {
        assert_eq!(fixture.state_of(rider), Some(StateName::Available));
    }
}
