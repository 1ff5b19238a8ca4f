use std::collections::HashMap;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use ri_envelope::{EventPayload, ResponsePayload};

use crate::{Adapter, AdapterError, NormalizedHeaders};

/// Discord-style signed webhook adapter: Ed25519 signature over
/// `"{timestamp}{body}"`, verified against `X-Signature-Ed25519` /
/// `X-Signature-Timestamp`.
pub struct DiscordAdapter {
    verifying_key: VerifyingKey,
}

impl DiscordAdapter {
    pub fn new(public_key_hex: &str) -> Result<Self, AdapterError> {
        let bytes = hex::decode(public_key_hex).map_err(|_| AdapterError::MissingField("public_key"))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| AdapterError::MissingField("public_key"))?;
        let verifying_key =
            VerifyingKey::from_bytes(&bytes).map_err(|_| AdapterError::MissingField("public_key"))?;
        Ok(Self { verifying_key })
    }
}

/// Discord's numeric interaction `type` field, mapped to a readable event
/// type string.
fn interaction_type_name(type_id: u64) -> &'static str {
    match type_id {
        1 => "ping",
        2 => "application_command",
        3 => "message_component",
        4 => "autocomplete",
        5 => "modal_submit",
        _ => "unknown",
    }
}

impl Adapter for DiscordAdapter {
    fn verify_signature(&self, raw_body: &[u8], headers: &NormalizedHeaders) -> bool {
        let Some(timestamp) = headers.get("x-signature-timestamp") else {
            return false;
        };
        let Some(signature_hex) = headers.get("x-signature-ed25519") else {
            return false;
        };
        let Ok(signature_bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature_bytes): Result<[u8; 64], _> = signature_bytes.try_into() else {
            return false;
        };
        let signature = Signature::from_bytes(&signature_bytes);

        let mut message = Vec::with_capacity(timestamp.len() + raw_body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(raw_body);

        self.verifying_key.verify(&message, &signature).is_ok()
    }

    fn parse_event(
        &self,
        raw_body: &[u8],
        _headers: &NormalizedHeaders,
    ) -> Result<EventPayload, AdapterError> {
        let body: serde_json::Value = serde_json::from_slice(raw_body)?;
        let type_id = body.get("type").and_then(|t| t.as_u64()).ok_or(AdapterError::MissingField("type"))?;
        let event_type = interaction_type_name(type_id).to_string();

        let session_id = body
            .get("guild_id")
            .and_then(|v| v.as_str())
            .or_else(|| body.get("channel_id").and_then(|v| v.as_str()))
            .unwrap_or("unknown")
            .to_string();

        let data = body
            .get("data")
            .and_then(|v| v.as_object())
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_else(HashMap::new);

        Ok(EventPayload { session_id, platform: "discord".to_string(), event_type, data })
    }

    fn format_response(&self, response: &ResponsePayload) -> Vec<u8> {
        serde_json::to_vec(&response.body).unwrap_or_default()
    }

    fn platform(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn make_keypair() -> (SigningKey, String) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let public_hex = hex::encode(signing_key.verifying_key().to_bytes());
        (signing_key, public_hex)
    }

    #[test]
    fn verify_signature_accepts_correctly_signed_request() {
        let (signing_key, public_hex) = make_keypair();
        let adapter = DiscordAdapter::new(&public_hex).unwrap();
        let body = br#"{"type":1}"#;
        let timestamp = "1000000000";

        let mut message = Vec::new();
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        let signature = signing_key.sign(&message);

        let headers = crate::normalize_headers([
            ("X-Signature-Timestamp", timestamp),
            ("X-Signature-Ed25519", hex::encode(signature.to_bytes()).as_str()),
        ]);
        assert!(adapter.verify_signature(body, &headers));
    }

    #[test]
    fn verify_signature_rejects_tampered_body() {
        let (signing_key, public_hex) = make_keypair();
        let adapter = DiscordAdapter::new(&public_hex).unwrap();
        let timestamp = "1000000000";
        let mut message = Vec::new();
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(br#"{"type":1}"#);
        let signature = signing_key.sign(&message);

        let headers = crate::normalize_headers([
            ("X-Signature-Timestamp", timestamp),
            ("X-Signature-Ed25519", hex::encode(signature.to_bytes()).as_str()),
        ]);
        assert!(!adapter.verify_signature(br#"{"type":2}"#, &headers));
    }

    #[test]
    fn parse_event_maps_ping_type_id() {
        let (_signing_key, public_hex) = make_keypair();
        let adapter = DiscordAdapter::new(&public_hex).unwrap();
        let event = adapter.parse_event(br#"{"type":1}"#, &NormalizedHeaders::new()).unwrap();
        assert_eq!(event.event_type, "ping");
        assert_eq!(event.platform, "discord");
    }

    #[test]
    fn parse_event_extracts_command_data() {
        let (_signing_key, public_hex) = make_keypair();
        let adapter = DiscordAdapter::new(&public_hex).unwrap();
        let body = br#"{"type":2,"guild_id":"g1","data":{"name":"ping"}}"#;
        let event = adapter.parse_event(body, &NormalizedHeaders::new()).unwrap();
        assert_eq!(event.event_type, "application_command");
        assert_eq!(event.session_id, "g1");
        assert_eq!(event.data.get("name").and_then(|v| v.as_str()), Some("ping"));
    }
}
