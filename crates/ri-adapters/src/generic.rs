use ri_envelope::{EventPayload, ResponsePayload};

use crate::{Adapter, AdapterError, NormalizedHeaders};

/// Trivial-accept adapter for first-party callers that post an already
/// broker-shaped event body directly (no external platform signature
/// scheme to verify).
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericAdapter;

impl GenericAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Adapter for GenericAdapter {
    fn verify_signature(&self, _raw_body: &[u8], _headers: &NormalizedHeaders) -> bool {
        true
    }

    fn parse_event(
        &self,
        raw_body: &[u8],
        _headers: &NormalizedHeaders,
    ) -> Result<EventPayload, AdapterError> {
        let mut event: EventPayload = serde_json::from_slice(raw_body)?;
        if event.platform.is_empty() {
            event.platform = "gateway".to_string();
        }
        Ok(event)
    }

    fn format_response(&self, response: &ResponsePayload) -> Vec<u8> {
        serde_json::to_vec(&response.body).unwrap_or_default()
    }

    fn platform(&self) -> &'static str {
        "gateway"
    }
}
