use std::collections::HashMap;

use hmac::{Hmac, Mac};
use ri_envelope::{EventPayload, ResponsePayload};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{Adapter, AdapterError, NormalizedHeaders};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age, in seconds, a `X-Slack-Request-Timestamp` may have before a
/// signature is rejected as a replay.
const MAX_TIMESTAMP_SKEW_SECONDS: i64 = 60 * 5;

/// Slack-style signed webhook adapter: HMAC-SHA256 over
/// `"v0:{timestamp}:{body}"`, compared against `X-Slack-Signature`.
pub struct SlackAdapter {
    signing_secret: String,
}

impl SlackAdapter {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self { signing_secret: signing_secret.into() }
    }

    fn expected_signature(&self, timestamp: &str, raw_body: &[u8]) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes()).ok()?;
        mac.update(b"v0:");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(raw_body);
        Some(mac.finalize().into_bytes().to_vec())
    }
}

impl Adapter for SlackAdapter {
    fn verify_signature(&self, raw_body: &[u8], headers: &NormalizedHeaders) -> bool {
        let Some(timestamp) = headers.get("x-slack-request-timestamp") else {
            return false;
        };
        let Some(provided) = headers.get("x-slack-signature") else {
            return false;
        };
        let Some(provided_hex) = provided.strip_prefix("v0=") else {
            return false;
        };
        let Ok(provided_bytes) = hex::decode(provided_hex) else {
            return false;
        };
        let Ok(timestamp_secs) = timestamp.parse::<i64>() else {
            return false;
        };
        let now = ri_envelope::now_unix_seconds();
        if (now - timestamp_secs).abs() > MAX_TIMESTAMP_SKEW_SECONDS {
            return false;
        }

        match self.expected_signature(timestamp, raw_body) {
            Some(expected) => expected.ct_eq(&provided_bytes).into(),
            None => false,
        }
    }

    fn parse_event(
        &self,
        raw_body: &[u8],
        _headers: &NormalizedHeaders,
    ) -> Result<EventPayload, AdapterError> {
        let body: serde_json::Value = serde_json::from_slice(raw_body)?;

        if let Some(challenge) = body.get("type").and_then(|t| t.as_str()).filter(|t| *t == "url_verification")
        {
            let mut data = HashMap::new();
            data.insert(
                "challenge".to_string(),
                body.get("challenge").cloned().unwrap_or(serde_json::Value::Null),
            );
            let _ = challenge;
            return Ok(EventPayload {
                session_id: String::new(),
                platform: "slack".to_string(),
                event_type: "url_verification".to_string(),
                data,
            });
        }

        let event = body.get("event").ok_or(AdapterError::MissingField("event"))?;
        let event_type = event
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(AdapterError::MissingField("event.type"))?
            .to_string();

        let session_id = body
            .get("team_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                event
                    .get("channel")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string()
            });

        let data = event
            .as_object()
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(EventPayload { session_id, platform: "slack".to_string(), event_type, data })
    }

    fn format_response(&self, response: &ResponsePayload) -> Vec<u8> {
        serde_json::to_vec(&response.body).unwrap_or_default()
    }

    fn platform(&self) -> &'static str {
        "slack"
    }
}
