use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ri_adapters::{AdapterRegistry, GenericAdapter, SlackAdapter};
use ri_bus::EventBus;
use ri_envelope::{Envelope, EnvelopeType, HeartbeatPayload, HeartbeatStatus, ResponsePayload};
use ri_gateway::{build_router, AppState};
use ri_registry::{Registration, Registry, RegistryConfig};
use tower::ServiceExt;

fn test_state(registry_config: RegistryConfig) -> AppState {
    let registry = Registry::new(registry_config);
    let bus = EventBus::new(registry.clone(), Duration::from_secs(2));
    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(GenericAdapter::new()));
    adapters.register(Arc::new(SlackAdapter::new("test-secret")));
    AppState {
        registry,
        bus,
        adapters: Arc::new(adapters),
        poll_timeout: Duration::from_millis(200),
        sync_webhook_timeout: Duration::from_secs(2),
        max_body_bytes: 1_048_576,
        metrics: None,
    }
}

fn register_online(state: &AppState, id: &str, capability: &str, max_concurrency: u32, load: f64) {
    state.registry.register(Registration {
        id: id.to_string(),
        version: "1.0".into(),
        capabilities: HashSet::from([capability.to_string()]),
        max_concurrency,
        labels: Default::default(),
    });
    state.registry.update_heartbeat(
        id,
        &HeartbeatPayload { status: HeartbeatStatus::Ok, load, inflight: 0 },
    );
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn happy_path_dispatch_via_sync_webhook() {
    let state = test_state(RegistryConfig::default());
    register_online(&state, "agent-a", "gateway.ping", 4, 0.1);
    let connection = state.registry.connections().get("agent-a").unwrap();
    let bus = state.bus.clone();
    let app = build_router(state);

    let dispatch = tokio::spawn(async move {
        let batch = connection.poll(Duration::from_secs(2)).await;
        assert_eq!(batch.len(), 1);
        let event_id = batch[0].id.clone();
        bus.handle_response(
            &event_id,
            ResponsePayload { platform: "gateway".into(), response_url: None, body: serde_json::json!({"ok": true}) },
        );
    });

    let request_body =
        serde_json::json!({"session_id": "s1", "platform": "gateway", "event_type": "ping", "data": {}});
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/gateway/sync")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    dispatch.await.unwrap();
}

#[tokio::test]
async fn load_based_selection_prefers_lowest_load_agent() {
    let state = test_state(RegistryConfig::default());
    register_online(&state, "agent-hi", "gateway.ping", 4, 0.9);
    register_online(&state, "agent-lo", "gateway.ping", 4, 0.1);
    let selected = state.registry.select_agent("gateway.ping").unwrap();
    assert_eq!(selected.id, "agent-lo");
}

#[tokio::test]
async fn agents_at_capacity_are_excluded_from_selection() {
    let state = test_state(RegistryConfig::default());
    state.registry.register(Registration {
        id: "agent-full".into(),
        version: "1.0".into(),
        capabilities: HashSet::from(["gateway.ping".to_string()]),
        max_concurrency: 1,
        labels: Default::default(),
    });
    state.registry.update_heartbeat(
        "agent-full",
        &HeartbeatPayload { status: HeartbeatStatus::Ok, load: 0.0, inflight: 1 },
    );
    assert!(state.registry.select_agent("gateway.ping").is_none());
}

#[tokio::test]
async fn stale_agent_is_swept_to_offline_and_loses_its_connection() {
    let config = RegistryConfig {
        queue_capacity: 100,
        sweep_interval: Duration::from_millis(5),
        heartbeat_timeout: Duration::from_millis(10),
        stale_timeout: Duration::from_millis(20),
    };
    let state = test_state(config);
    register_online(&state, "agent-a", "gateway.ping", 4, 0.0);

    let cancel = state.registry.sweep_cancellation();
    let sweeper = tokio::spawn(state.registry.clone().run_health_sweep(cancel));

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(state.registry.get("agent-a").unwrap().state, ri_registry::AgentState::Offline);
    assert!(!state.registry.connections().contains("agent-a"));

    state.registry.stop_sweep();
    sweeper.await.unwrap();
}

#[tokio::test]
async fn full_queue_fails_publish_without_http_ever_blocking() {
    let state = test_state(RegistryConfig { queue_capacity: 2, ..RegistryConfig::default() });
    register_online(&state, "agent-a", "gateway.ping", 100, 0.0);

    let connection = state.registry.connections().get("agent-a").unwrap();
    for i in 0..2 {
        let envelope = Envelope::event(
            format!("filler-{i}"),
            &ri_envelope::EventPayload {
                session_id: "s".into(),
                platform: "gateway".into(),
                event_type: "ping".into(),
                data: Default::default(),
            },
        );
        assert!(connection.enqueue(envelope));
    }

    let request_body =
        serde_json::json!({"session_id": "s1", "platform": "gateway", "event_type": "ping", "data": {}});
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/gateway/sync")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn slack_url_verification_handshake_echoes_challenge_without_an_agent() {
    let state = test_state(RegistryConfig::default());
    let app = build_router(state);

    let body = serde_json::json!({"type": "url_verification", "challenge": "abc123"});
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/slack/sync")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"abc123");
}

#[tokio::test]
async fn unsupported_platform_returns_not_implemented() {
    let state = test_state(RegistryConfig::default());
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/teams/sync")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn register_then_poll_round_trips_via_http() {
    let state = test_state(RegistryConfig::default());
    let app = build_router(state.clone());

    let register_body =
        serde_json::json!({"ri_id": "agent-http", "version": "1.0", "capabilities": ["gateway.ping"], "max_concurrency": 4});
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ri/register")
                .header("content-type", "application/json")
                .body(Body::from(register_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/ri/poll")
                .header("x-ri-id", "agent-http")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn response_with_wrong_envelope_type_is_rejected() {
    let state = test_state(RegistryConfig::default());
    let app = build_router(state);

    let envelope = Envelope::heartbeat(
        "evt-1",
        &HeartbeatPayload { status: HeartbeatStatus::Ok, load: 0.0, inflight: 0 },
    );
    assert_eq!(envelope.kind, EnvelopeType::Heartbeat);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ri/response")
                .header("content-type", "application/json")
                .header("x-ri-id", "agent-a")
                .body(Body::from(serde_json::to_string(&envelope).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
