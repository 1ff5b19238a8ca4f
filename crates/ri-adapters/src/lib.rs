//! Platform adapter interface (component C6): verify/parse/format plug-in
//! surface that turns a platform-specific signed webhook payload into the
//! broker's uniform [`EventPayload`], and a dispatched [`ResponsePayload`]
//! back into a platform-specific reply body.
//!
//! Grounded on the multi-credential-validator shape of the teacher's gateway
//! authenticator (one small validator type per credential kind, composed
//! behind a single verifying facade), generalised from "one gateway, several
//! credential kinds" to "one registry, several platforms".

mod discord;
mod error;
mod generic;
mod slack;

pub use discord::DiscordAdapter;
pub use error::AdapterError;
pub use generic::GenericAdapter;
pub use slack::SlackAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use ri_envelope::{EventPayload, ResponsePayload};

/// Request headers, normalized to lowercase keys. Kept decoupled from any
/// particular HTTP framework's header type so adapters don't depend on axum.
pub type NormalizedHeaders = HashMap<String, String>;

/// A platform-specific verify/parse/format plug-in.
pub trait Adapter: Send + Sync {
    /// Authenticates the request per platform rules. Must run in constant
    /// time against the raw body (no early-return on the first mismatched
    /// byte) and must be called before `parse_event`.
    fn verify_signature(&self, raw_body: &[u8], headers: &NormalizedHeaders) -> bool;

    /// Extracts `platform`, `event_type`, and a `data` map from the raw body.
    fn parse_event(
        &self,
        raw_body: &[u8],
        headers: &NormalizedHeaders,
    ) -> Result<EventPayload, AdapterError>;

    /// Produces the platform-specific reply body for delayed (response_url)
    /// callbacks.
    fn format_response(&self, response: &ResponsePayload) -> Vec<u8>;

    fn platform(&self) -> &'static str;
}

/// Maps platform name to its adapter.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(adapter.platform().to_string(), adapter);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(platform).cloned()
    }
}

/// Lowercase every header name so adapters don't need to worry about casing.
pub fn normalize_headers<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> NormalizedHeaders {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_by_platform_name_and_rejects_unknown() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(GenericAdapter::new()));
        assert!(registry.get("gateway").is_some());
        assert!(registry.get("teams").is_none());
    }

    #[test]
    fn normalize_headers_lowercases_keys() {
        let headers = normalize_headers([("X-Slack-Signature", "v0=abc")]);
        assert_eq!(headers.get("x-slack-signature").map(String::as_str), Some("v0=abc"));
    }
}
