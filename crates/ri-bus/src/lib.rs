//! Event Bus (component C5): synthesises request/response call semantics on
//! top of the one-way per-Agent queue by correlating an EventID between the
//! enqueue side (`Publish`) and the delivery side (`HandleResponse`).
//!
//! Grounded on the pending-oneshot-keyed-by-request-id rendezvous pattern
//! used for node RPC invocation elsewhere in this codebase's lineage; the
//! one-shot slot itself lives on the target Agent's `Connection`, and the
//! bus layers selection, a bookkeeping table, and timeout/cancellation
//! semantics on top.

mod error;

pub use error::BrokerError;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use metrics::gauge;
use parking_lot::RwLock;
use ri_envelope::{new_event_id, Envelope, EventPayload, ResponsePayload};
use ri_registry::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
struct InflightEntry {
    agent_id: String,
    #[allow(dead_code)]
    created_at: Instant,
}

pub struct EventBus {
    registry: Arc<Registry>,
    inflight: RwLock<HashMap<String, InflightEntry>>,
    response_timeout: Duration,
}

impl EventBus {
    pub fn new(registry: Arc<Registry>, response_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            inflight: RwLock::new(HashMap::new()),
            response_timeout,
        })
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.read().len()
    }

    fn record_inflight_gauge(&self) {
        gauge!("bus_inflight_requests", self.inflight_count() as f64);
    }

    /// Dispatch `event`, blocking until a response arrives, the response
    /// timeout elapses, or `cancel` fires. The inflight bookkeeping entry is
    /// always removed before returning, regardless of outcome.
    #[instrument(skip(self, event, cancel), fields(capability = %event.capability()))]
    pub async fn publish(
        &self,
        event: EventPayload,
        event_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<ResponsePayload, BrokerError> {
        let capability = event.capability();
        let agent = self
            .registry
            .select_agent(&capability)
            .ok_or(BrokerError::NoAgentAvailable)?;
        let connection = self
            .registry
            .connections()
            .get(&agent.id)
            .ok_or(BrokerError::NoConnection)?;

        let event_id = event_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_event_id);

        self.inflight.write().insert(
            event_id.clone(),
            InflightEntry {
                agent_id: agent.id.clone(),
                created_at: Instant::now(),
            },
        );
        self.record_inflight_gauge();

        let receiver = connection.add_pending(&event_id);
        let envelope = Envelope::event(event_id.clone(), &event);

        if !connection.enqueue(envelope) {
            self.inflight.write().remove(&event_id);
            self.record_inflight_gauge();
            connection.remove_pending(&event_id);
            return Err(BrokerError::QueueFull);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BrokerError::Cancelled),
            received = receiver => received.map_err(|_| BrokerError::ResponseTimeout),
            _ = tokio::time::sleep(self.response_timeout) => Err(BrokerError::ResponseTimeout),
        };

        self.inflight.write().remove(&event_id);
        self.record_inflight_gauge();
        connection.remove_pending(&event_id);
        result
    }

    /// Fire-and-forget dispatch: identical selection/enqueue path as
    /// [`publish`](Self::publish), but returns the minted EventID immediately
    /// without registering an inflight entry. Responses that arrive later
    /// are dropped by `handle_response` (no waiter is ever recorded).
    pub fn publish_async(
        &self,
        event: EventPayload,
        event_id: Option<String>,
    ) -> Result<String, BrokerError> {
        let capability = event.capability();
        let agent = self
            .registry
            .select_agent(&capability)
            .ok_or(BrokerError::NoAgentAvailable)?;
        let connection = self
            .registry
            .connections()
            .get(&agent.id)
            .ok_or(BrokerError::NoConnection)?;

        let event_id = event_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_event_id);
        let envelope = Envelope::event(event_id.clone(), &event);

        if !connection.enqueue(envelope) {
            return Err(BrokerError::QueueFull);
        }
        Ok(event_id)
    }

    /// Deliver a response posted to `/ri/response` to the waiter for
    /// `event_id`, if one is still registered. Returns `false` — never an
    /// error — when there is no waiter or it was already satisfied; both are
    /// ordinary outcomes (e.g. the response arrived after the timeout).
    pub fn handle_response(&self, event_id: &str, response: ResponsePayload) -> bool {
        let agent_id = {
            let inflight = self.inflight.read();
            inflight.get(event_id).map(|entry| entry.agent_id.clone())
        };

        let Some(agent_id) = agent_id else {
            return false;
        };

        match self.registry.connections().get(&agent_id) {
            Some(connection) => connection.complete_pending(event_id, response),
            None => {
                warn!(event_id, agent_id, "inflight agent has no connection");
                false
            }
        }
    }
}
