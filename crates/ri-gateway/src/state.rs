use std::sync::Arc;
use std::time::Duration;

use ri_adapters::AdapterRegistry;
use ri_bus::EventBus;
use ri_registry::Registry;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub bus: Arc<EventBus>,
    pub adapters: Arc<AdapterRegistry>,
    pub poll_timeout: Duration,
    pub sync_webhook_timeout: Duration,
    pub max_body_bytes: usize,
    pub metrics: Option<ri_observability::MetricsExporter>,
}
