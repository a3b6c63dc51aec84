//! End-to-end registration behaviour against scripted registry responses.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_matches::assert_matches;
use beacon_core::effects::{HttpError, HttpMethod, StorageEffects, WorkResult};
use beacon_core::{BeaconConfig, ChannelCreateMethod, ChannelId, RegistrationUpdate};
use beacon_effects::MemoryStorageHandler;
use beacon_sync::{ChannelRegistrar, RegistrarEffects, RESTORE_CONSUMED_KEY};
use beacon_testkit::{
    channel_json, channel_location, init_test_tracing, test_config, ControllableClock,
    RecordingWorkDispatcher, ScriptedHttpHandler, TEST_RESTORE_ID,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

struct Harness {
    registrar: Arc<ChannelRegistrar>,
    http: Arc<ScriptedHttpHandler>,
    clock: ControllableClock,
    dispatcher: Arc<RecordingWorkDispatcher>,
}

fn harness(config: BeaconConfig) -> Harness {
    init_test_tracing();
    let http = Arc::new(ScriptedHttpHandler::new());
    let clock = ControllableClock::default();
    let dispatcher = Arc::new(RecordingWorkDispatcher::new());
    let effects = RegistrarEffects {
        storage: Arc::new(MemoryStorageHandler::new()),
        http: http.clone(),
        time: Arc::new(clock.clone()),
        dispatcher: dispatcher.clone(),
    };
    Harness {
        registrar: Arc::new(ChannelRegistrar::new(config, effects).unwrap()),
        http,
        clock,
        dispatcher,
    }
}

/// Harness with channel `abc` already created at its canonical location.
async fn registered() -> Harness {
    let h = harness(test_config());
    h.http.push_json(201, &channel_json("abc", &channel_location("abc")));
    assert_eq!(
        h.registrar.perform_registration(false).await.unwrap(),
        WorkResult::Success
    );
    h
}

fn channel_body(h: &Harness, index: usize) -> serde_json::Value {
    h.http.requests()[index].json_body().unwrap()["channel"].clone()
}

#[tokio::test]
async fn created_channel_is_persisted_then_announced() {
    let h = harness(test_config());
    let mut updates = h.registrar.subscribe();
    h.http.push_json(201, &channel_json("abc", "https://x/abc"));

    let result = h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(result, WorkResult::Success);

    let event = updates.recv().await.unwrap();
    assert_eq!(
        event,
        RegistrationUpdate::Created {
            channel_id: "abc".into(),
            is_existing: false
        }
    );
    let identity = h.registrar.identity().await.unwrap().unwrap();
    assert_eq!(identity.channel_id.as_str(), "abc");
    assert_eq!(identity.location, "https://x/abc");
    assert_eq!(identity.last_update_ms, h.clock.current_ms());

    let request = &h.http.requests()[0];
    assert_eq!(request.method, HttpMethod::Post);
    assert!(request.header("authorization").is_some());
    assert_eq!(channel_body(&h, 0)["device_type"], "linux");
    assert_eq!(channel_body(&h, 0)["app_version"], "1.0.0");
}

#[tokio::test]
async fn create_returning_existing_channel_is_flagged() {
    let h = harness(test_config());
    let mut updates = h.registrar.subscribe();
    h.http.push_json(200, &channel_json("abc", "https://x/abc"));

    h.registrar.perform_registration(false).await.unwrap();
    assert_matches!(
        updates.recv().await.unwrap(),
        RegistrationUpdate::Created { is_existing: true, .. }
    );
}

#[tokio::test]
async fn create_without_location_uses_canonical_location() {
    let h = harness(test_config());
    h.http.push_json(201, r#"{"channel_id":"abc"}"#);
    h.registrar.perform_registration(false).await.unwrap();
    let identity = h.registrar.identity().await.unwrap().unwrap();
    assert_eq!(identity.location, channel_location("abc"));
}

#[tokio::test]
async fn create_failures_map_to_work_results() {
    let h = harness(test_config());
    h.http.push_json(400, "");
    h.http.push_json(404, "");
    h.http.push_json(409, "");
    h.http.push_json(500, "");
    h.http.push_json(429, "");
    h.http.push_error(HttpError::transport("offline"));

    // Client errors are permanent: report success so the engine stops retrying.
    assert_eq!(
        h.registrar.perform_registration(false).await.unwrap(),
        WorkResult::Success
    );
    // 404 and 409 are not permanent on create.
    for _ in 0..5 {
        assert_eq!(
            h.registrar.perform_registration(false).await.unwrap(),
            WorkResult::Failure
        );
    }
    assert!(h.registrar.identity().await.unwrap().is_none());
}

#[tokio::test]
async fn repeated_requests_within_window_update_once() {
    let h = registered().await;
    h.clock.advance(DAY + Duration::from_secs(1));
    h.registrar.register_worker().await;

    h.registrar.register(false).await;
    h.registrar.register(false).await;
    assert_eq!(h.dispatcher.pending().len(), 1);

    h.http.push_json(200, "");
    let results = h.dispatcher.run_pending().await;
    assert_eq!(results.len(), 1);
    assert_eq!(h.http.request_count(), 2);

    h.registrar.register(false).await;
    h.dispatcher.run_pending().await;
    assert_eq!(h.http.request_count(), 2);
}

#[tokio::test]
async fn unchanged_payload_is_resent_exactly_at_window_end() {
    let h = registered().await;

    h.clock.advance(DAY - Duration::from_millis(1));
    h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(h.http.request_count(), 1);

    h.clock.advance(Duration::from_millis(1));
    h.http.push_json(200, "");
    h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(h.http.request_count(), 2);
    assert_eq!(h.http.requests()[1].method, HttpMethod::Put);
}

#[tokio::test]
async fn forceful_registration_bypasses_window() {
    let h = registered().await;
    let mut updates = h.registrar.subscribe();
    h.http.push_json(200, "");

    let result = h.registrar.perform_registration(true).await.unwrap();
    assert_eq!(result, WorkResult::Success);
    assert_eq!(h.http.request_count(), 2);
    assert_eq!(h.http.requests()[1].url, channel_location("abc"));
    assert_eq!(
        updates.recv().await.unwrap(),
        RegistrationUpdate::Updated {
            channel_id: "abc".into()
        }
    );
}

#[tokio::test]
async fn changed_payload_sends_only_the_difference() {
    let h = registered().await;
    let carrier = Arc::new(Mutex::new(None::<String>));
    let source = carrier.clone();
    h.registrar.add_extender(move |mut payload| {
        payload.carrier = source.lock().unwrap().clone();
        payload
    });

    *carrier.lock().unwrap() = Some("acme".into());
    h.http.push_json(200, "");
    h.registrar.perform_registration(false).await.unwrap();

    let body = channel_body(&h, 1);
    assert_eq!(body["carrier"], "acme");
    assert_eq!(body["device_type"], "linux");
    assert!(body.get("app_version").is_none());
    assert_eq!(body["set_tags"], false);

    let identity = h.registrar.identity().await.unwrap().unwrap();
    assert_eq!(identity.last_payload.carrier.as_deref(), Some("acme"));
    assert_eq!(identity.last_payload.app_version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn tag_changes_are_sent_as_delta() {
    let h = harness(test_config());
    let tags = Arc::new(Mutex::new(BTreeSet::from(["a".to_string(), "b".to_string()])));
    let source = tags.clone();
    h.registrar.add_extender(move |mut payload| {
        payload.tags = Some(source.lock().unwrap().clone());
        payload
    });

    h.http.push_json(201, &channel_json("abc", &channel_location("abc")));
    h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(channel_body(&h, 0)["set_tags"], true);

    *tags.lock().unwrap() = BTreeSet::from(["b".to_string(), "c".to_string()]);
    h.http.push_json(200, "");
    h.registrar.perform_registration(false).await.unwrap();

    let body = channel_body(&h, 1);
    assert_eq!(body["tag_changes"]["add"], serde_json::json!(["c"]));
    assert_eq!(body["tag_changes"]["remove"], serde_json::json!(["a"]));
}

#[tokio::test]
async fn invalid_channel_resets_identity_and_recreates() {
    for status in [404, 409] {
        let h = registered().await;
        h.http.push_json(status, "");

        let result = h.registrar.perform_registration(true).await.unwrap();
        assert_eq!(result, WorkResult::Failure);
        assert!(h.registrar.channel_id().await.unwrap().is_none());

        h.http.push_json(201, &channel_json("def", &channel_location("def")));
        h.registrar.perform_registration(false).await.unwrap();
        assert_eq!(h.http.requests()[2].method, HttpMethod::Post);
        assert_eq!(
            h.registrar.channel_id().await.unwrap(),
            Some(ChannelId::new("def"))
        );
    }
}

#[tokio::test]
async fn bad_request_on_update_is_dropped_without_state_change() {
    let h = registered().await;
    let before = h.registrar.identity().await.unwrap();
    let mut updates = h.registrar.subscribe();
    h.http.push_json(400, "");

    let result = h.registrar.perform_registration(true).await.unwrap();
    assert_eq!(result, WorkResult::Success);
    assert_eq!(h.registrar.identity().await.unwrap(), before);
    assert_matches!(updates.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn transient_update_failures_keep_identity() {
    let h = registered().await;
    let before = h.registrar.identity().await.unwrap();
    h.http.push_json(500, "");
    h.http
        .push(beacon_core::effects::HttpResponse::new(429).with_header("Retry-After", "5"));
    h.http.push_error(HttpError::transport("offline"));

    for _ in 0..3 {
        assert_eq!(
            h.registrar.perform_registration(true).await.unwrap(),
            WorkResult::Failure
        );
    }
    assert_eq!(h.registrar.identity().await.unwrap(), before);
}

#[tokio::test]
async fn moved_channel_gets_full_payload_on_next_update() {
    let h = registered().await;
    h.http
        .push_json(200, r#"{"channel_id":"abc","location":"https://moved.example.com/abc"}"#);
    h.registrar.perform_registration(true).await.unwrap();

    let identity = h.registrar.identity().await.unwrap().unwrap();
    assert_eq!(identity.location, "https://moved.example.com/abc");
    assert!(identity.requires_full_payload);

    // A pending resync is never throttled.
    h.http.push_json(200, "");
    h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(h.http.request_count(), 3);
    assert_eq!(channel_body(&h, 2)["app_version"], "1.0.0");

    let identity = h.registrar.identity().await.unwrap().unwrap();
    assert!(!identity.requires_full_payload);
}

#[tokio::test]
async fn dropped_execution_leaves_identity_untouched() {
    let h = registered().await;
    let before = h.registrar.identity().await.unwrap();
    h.http.push_hang();

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        h.registrar.perform_registration(true),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(h.http.request_count(), 2);
    assert_eq!(h.registrar.identity().await.unwrap(), before);

    let fresh = harness(test_config());
    fresh.http.push_hang();
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        fresh.registrar.perform_registration(false),
    )
    .await;
    assert!(outcome.is_err());
    assert!(fresh.registrar.identity().await.unwrap().is_none());
}

fn restore_config(restore_id: &str) -> BeaconConfig {
    BeaconConfig {
        channel_create_method: ChannelCreateMethod::Restore(restore_id.into()),
        ..test_config()
    }
}

#[tokio::test]
async fn restore_reclaims_previous_channel() {
    let h = harness(restore_config(TEST_RESTORE_ID));
    let mut updates = h.registrar.subscribe();
    h.http.push_json(200, "");

    let result = h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(result, WorkResult::Success);
    assert_eq!(
        updates.recv().await.unwrap(),
        RegistrationUpdate::Created {
            channel_id: TEST_RESTORE_ID.into(),
            is_existing: true
        }
    );

    let request = &h.http.requests()[0];
    assert_eq!(request.method, HttpMethod::Put);
    assert_eq!(request.url, channel_location(TEST_RESTORE_ID));
    let identity = h.registrar.identity().await.unwrap().unwrap();
    assert_eq!(identity.location, channel_location(TEST_RESTORE_ID));
}

#[tokio::test]
async fn refused_restore_falls_back_to_create() {
    for status in [404, 409, 400] {
        let h = harness(restore_config(TEST_RESTORE_ID));
        let mut updates = h.registrar.subscribe();
        h.http.push_json(status, "");
        h.http.push_json(201, &channel_json("fresh", &channel_location("fresh")));

        h.registrar.perform_registration(false).await.unwrap();
        let requests = h.http.requests();
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert_eq!(requests[1].method, HttpMethod::Post);
        assert_eq!(
            updates.recv().await.unwrap(),
            RegistrationUpdate::Created {
                channel_id: "fresh".into(),
                is_existing: false
            }
        );
    }
}

#[tokio::test]
async fn identity_reset_after_restore_creates_instead_of_restoring_again() {
    let h = harness(restore_config(TEST_RESTORE_ID));
    h.http.push_json(200, "");
    h.registrar.perform_registration(false).await.unwrap();

    h.http.push_json(404, "");
    assert_eq!(
        h.registrar.perform_registration(true).await.unwrap(),
        WorkResult::Failure
    );
    assert!(h.registrar.channel_id().await.unwrap().is_none());

    h.http.push_json(201, &channel_json("fresh", &channel_location("fresh")));
    assert_eq!(
        h.registrar.perform_registration(false).await.unwrap(),
        WorkResult::Success
    );
    let requests = h.http.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2].method, HttpMethod::Post);
    assert_eq!(
        h.registrar.channel_id().await.unwrap(),
        Some(ChannelId::new("fresh"))
    );
}

#[tokio::test]
async fn restore_is_skipped_when_storage_shows_a_prior_registration() {
    init_test_tracing();
    let storage = Arc::new(MemoryStorageHandler::new());
    storage
        .store(RESTORE_CONSUMED_KEY, b"true".to_vec())
        .await
        .unwrap();
    let http = Arc::new(ScriptedHttpHandler::new());
    let registrar = ChannelRegistrar::new(
        restore_config(TEST_RESTORE_ID),
        RegistrarEffects {
            storage,
            http: http.clone(),
            time: Arc::new(ControllableClock::default()),
            dispatcher: Arc::new(RecordingWorkDispatcher::new()),
        },
    )
    .unwrap();
    http.push_json(201, &channel_json("fresh", &channel_location("fresh")));

    registrar.perform_registration(false).await.unwrap();
    assert_eq!(http.request_count(), 1);
    assert_eq!(http.requests()[0].method, HttpMethod::Post);
}

#[tokio::test]
async fn transient_restore_failure_is_retried_not_replaced() {
    let h = harness(restore_config(TEST_RESTORE_ID));
    h.http.push_json(503, "");

    let result = h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(result, WorkResult::Failure);
    assert_eq!(h.http.request_count(), 1);
    assert!(h.registrar.identity().await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_restore_id_creates_directly() {
    let h = harness(restore_config("not-a-channel"));
    h.http.push_json(201, &channel_json("fresh", &channel_location("fresh")));

    h.registrar.perform_registration(false).await.unwrap();
    assert_eq!(h.http.request_count(), 1);
    assert_eq!(h.http.requests()[0].method, HttpMethod::Post);
}

#[tokio::test]
async fn engine_driven_execution_reads_force_flag() {
    let h = registered().await;
    h.registrar.register_worker().await;
    h.http.push_json(200, "");

    h.registrar.register(true).await;
    let results = h.dispatcher.run_pending().await;
    assert_eq!(results, vec![("registration".to_string(), WorkResult::Success)]);
    assert_eq!(h.http.request_count(), 2);
}

#[tokio::test]
async fn network_bound_registration_waits_for_connectivity() {
    let h = harness(test_config());
    h.registrar.register_worker().await;
    h.dispatcher.set_network_available(false);
    h.registrar.register(false).await;

    assert!(h.dispatcher.run_pending().await.is_empty());
    assert_eq!(h.http.request_count(), 0);

    h.dispatcher.set_network_available(true);
    h.http.push_json(201, &channel_json("abc", &channel_location("abc")));
    h.dispatcher.run_pending().await;
    assert!(h.registrar.channel_id().await.unwrap().is_some());
}
