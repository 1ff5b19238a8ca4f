use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use metrics::counter;
use ri_envelope::EventPayload;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Default cap on the background dispatch a fire-and-forget webhook starts
/// after it has already replied 200 to the platform caller.
const ASYNC_DISPATCH_CAP: Duration = Duration::from_secs(25);

fn normalized_headers(headers: &HeaderMap) -> ri_adapters::NormalizedHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Slack-style `url_verification` and Discord-style `ping` are answered at
/// ingress, independent of any adapter, before a capability is ever selected.
fn handshake_response(body: &serde_json::Value) -> Option<axum::response::Response> {
    if body.get("type").and_then(|t| t.as_str()) == Some("url_verification") {
        let challenge = body.get("challenge").and_then(|c| c.as_str()).unwrap_or_default();
        return Some((StatusCode::OK, challenge.to_string()).into_response());
    }
    if body.get("type").and_then(|t| t.as_u64()) == Some(1) {
        return Some((StatusCode::OK, Json(serde_json::json!({"type": 1}))).into_response());
    }
    None
}

async fn verify_and_parse(
    state: &AppState,
    platform: &str,
    headers: &HeaderMap,
    raw_body: &[u8],
) -> Result<EventPayload, ApiError> {
    let adapter = state
        .adapters
        .get(platform)
        .ok_or_else(|| ApiError::unsupported_platform(platform.to_string()))?;
    let normalized = normalized_headers(headers);

    if !adapter.verify_signature(raw_body, &normalized) {
        return Err(ri_bus::BrokerError::AuthFailed.into());
    }

    adapter
        .parse_event(raw_body, &normalized)
        .map_err(|err| ApiError::malformed(err.to_string()))
}

/// `POST /webhook/{platform}`: acknowledge immediately, dispatch in the
/// background with a fresh (request-independent) context capped at 25s.
#[instrument(skip(state, headers, raw_body), fields(platform = %platform))]
pub async fn webhook_async(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    raw_body: axum::body::Bytes,
) -> Result<impl IntoResponse, ApiError> {
    counter!("gateway_requests_total", 1, "route" => "webhook_async", "platform" => platform.clone());
    if let Ok(body) = serde_json::from_slice::<serde_json::Value>(&raw_body) {
        if let Some(handshake) = handshake_response(&body) {
            return Ok(handshake);
        }
    }

    let event = verify_and_parse(&state, &platform, &headers, &raw_body).await?;

    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        let result = tokio::time::timeout(ASYNC_DISPATCH_CAP, state.bus.publish(event, None, cancel)).await;

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(error = %err, "async webhook dispatch failed");
                return;
            }
            Err(_) => {
                warn!("async webhook dispatch exceeded its cap");
                return;
            }
        };

        let Some(callback_url) = response.response_url.clone() else {
            return;
        };
        let Some(adapter) = state.adapters.get(&response.platform) else {
            return;
        };
        let body = adapter.format_response(&response);
        let client = reqwest::Client::new();
        if let Err(err) = client.post(&callback_url).body(body).send().await {
            error!(error = %err, url = %callback_url, "delayed callback POST failed");
        }
    });

    Ok(StatusCode::OK.into_response())
}

/// `POST /webhook/{platform}/sync`: verify, parse, publish synchronously
/// with a 25s cap, return the response body (or a placeholder if empty).
#[instrument(skip(state, headers, raw_body), fields(platform = %platform))]
pub async fn webhook_sync(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    raw_body: axum::body::Bytes,
) -> Result<impl IntoResponse, ApiError> {
    counter!("gateway_requests_total", 1, "route" => "webhook_sync", "platform" => platform.clone());
    if let Ok(body) = serde_json::from_slice::<serde_json::Value>(&raw_body) {
        if let Some(handshake) = handshake_response(&body) {
            return Ok(handshake);
        }
    }

    let event = verify_and_parse(&state, &platform, &headers, &raw_body).await?;
    let cancel = CancellationToken::new();

    let result =
        tokio::time::timeout(state.sync_webhook_timeout, state.bus.publish(event, None, cancel)).await;

    match result {
        Ok(Ok(response)) => Ok(Json(response.body).into_response()),
        Ok(Err(err)) => Err(ApiError::from(err)),
        Err(_) => Ok(Json(
            serde_json::json!({"status": "processed", "message": "no response from RI"}),
        )
        .into_response()),
    }
}
