use std::collections::HashMap;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use metrics::counter;
use ri_envelope::{Envelope, EnvelopeType, HeartbeatPayload};
use ri_registry::Registration;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

pub const AGENT_ID_HEADER: &str = "x-ri-id";

pub fn agent_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(AGENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::malformed("missing X-RI-ID header"))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub ri_id: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub max_concurrency: u32,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub remote_config: Option<serde_json::Value>,
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    counter!("gateway_requests_total", 1, "route" => "register");
    if body.ri_id.is_empty() {
        return Err(ApiError::malformed("ri_id must not be empty"));
    }
    let registration = Registration {
        id: body.ri_id,
        version: body.version,
        capabilities: body.capabilities.into_iter().collect(),
        max_concurrency: body.max_concurrency,
        labels: body.labels,
    };
    let info = state.registry.register(registration);
    Ok(Json(info))
}

#[instrument(skip(state, body))]
pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<HeartbeatPayload>,
) -> Result<impl IntoResponse, ApiError> {
    counter!("gateway_requests_total", 1, "route" => "heartbeat");
    let id = agent_id(&headers)?;
    if state.registry.update_heartbeat(&id, &body) {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::unknown_agent(id))
    }
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub events: Vec<Envelope>,
}

#[instrument(skip(state))]
pub async fn poll(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    counter!("gateway_requests_total", 1, "route" => "poll");
    let id = agent_id(&headers)?;
    let connection = state
        .registry
        .connections()
        .get(&id)
        .ok_or_else(|| ApiError::unknown_agent(id))?;
    let events = connection.poll(state.poll_timeout).await;
    Ok(Json(PollResponse { events }))
}

#[instrument(skip(state, body))]
pub async fn response(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Envelope>,
) -> Result<impl IntoResponse, ApiError> {
    counter!("gateway_requests_total", 1, "route" => "response");
    let _id = agent_id(&headers)?;
    if body.kind != EnvelopeType::Response {
        return Err(ApiError::malformed(format!(
            "expected envelope type response, got {:?}",
            body.kind
        )));
    }
    let payload = body
        .decode::<ri_envelope::ResponsePayload>()
        .map_err(|err| ApiError::malformed(err.to_string()))?;
    state.bus.handle_response(&body.id, payload);
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ri_count: usize,
    pub inflight: u32,
    pub timestamp: i64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        ri_count: state.registry.len(),
        inflight: state.registry.total_inflight(),
        timestamp: Utc::now().timestamp(),
    })
}

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.list())
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(exporter) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            exporter.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
