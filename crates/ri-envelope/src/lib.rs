//! Uniform wire envelope shared between the broker core and every Agent /
//! platform adapter. Mirrors the correlation-id + typed-payload shape used
//! for inter-agent messages elsewhere in this workspace's lineage, generalised
//! to the broker's event/response/heartbeat/control/error taxonomy.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminant carried by every [`Envelope`]. Unknown values fail to
/// deserialize rather than being silently accepted, so malformed `type`
/// fields are rejected at the ingress boundary instead of propagating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Event,
    Response,
    Heartbeat,
    Control,
    Error,
}

/// The uniform wrapper around every message crossing the broker/Agent
/// boundary. `payload` is opaque to anything that doesn't already know the
/// envelope's `kind` — callers decode it into the matching `*Payload` type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub id: String,
    pub timestamp: i64,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Build an envelope from a typed payload, stamping the current
    /// wall-clock second. `id` is the caller's correlation id (an event id,
    /// an Agent id for control broadcasts, etc).
    pub fn new(kind: EnvelopeType, id: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            kind,
            id: id.into(),
            timestamp: now_unix_seconds(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn event(id: impl Into<String>, payload: &EventPayload) -> Self {
        Self::new(EnvelopeType::Event, id, payload)
    }

    pub fn response(id: impl Into<String>, payload: &ResponsePayload) -> Self {
        Self::new(EnvelopeType::Response, id, payload)
    }

    pub fn heartbeat(id: impl Into<String>, payload: &HeartbeatPayload) -> Self {
        Self::new(EnvelopeType::Heartbeat, id, payload)
    }

    pub fn control(id: impl Into<String>, payload: &ControlPayload) -> Self {
        Self::new(EnvelopeType::Control, id, payload)
    }

    pub fn error(id: impl Into<String>, payload: &ErrorPayload) -> Self {
        Self::new(EnvelopeType::Error, id, payload)
    }

    /// Decode `payload` into a typed value, e.g. `env.decode::<EventPayload>()`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_value(self.payload.clone()).map_err(EnvelopeError::InvalidPayload)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("payload does not match expected shape: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    #[error("envelope has unexpected type (wanted {expected:?}, got {actual:?})")]
    WrongType {
        expected: EnvelopeType,
        actual: EnvelopeType,
    },
}

pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Mint a fresh correlation id, used when a caller does not supply one.
pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

/// Inbound event, as produced by a platform adapter's `ParseEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub session_id: String,
    pub platform: String,
    pub event_type: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl EventPayload {
    /// The capability string the registry selects Agents by, e.g. `slack.message`.
    pub fn capability(&self) -> String {
        format!("{}.{}", self.platform, self.event_type)
    }
}

/// An Agent's reply to a dispatched event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Ok,
    Degraded,
}

/// Periodic liveness/load report an Agent posts to `/ri/heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub status: HeartbeatStatus,
    pub load: f64,
    pub inflight: u32,
}

/// Administrative signal, used for the broadcast primitive and sweeper-issued
/// notices to a Connection's pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPayload {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error detail, matches the §7 taxonomy's `code` names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// Seam for an opaque-payload codec (e.g. AES-GCM). The broker core only
/// ever depends on this trait; the shipped implementation is a pass-through.
/// A production deployment that wants encrypted payloads in transit would
/// provide its own `PayloadCodec` without touching the broker core.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, value: &serde_json::Value) -> Result<serde_json::Value, EnvelopeError>;
    fn decode(&self, value: &serde_json::Value) -> Result<serde_json::Value, EnvelopeError>;
}

/// Identity codec: encode/decode are no-ops. This is the only codec shipped
/// with the broker; the AES-GCM boundary is documented, not implemented.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextCodec;

impl PayloadCodec for PlaintextCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<serde_json::Value, EnvelopeError> {
        Ok(value.clone())
    }

    fn decode(&self, value: &serde_json::Value) -> Result<serde_json::Value, EnvelopeError> {
        Ok(value.clone())
    }
}
