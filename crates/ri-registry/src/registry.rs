//! Agent metadata, capability index, health state machine, and selection
//! policy. Grounded on the Arc<RwLock<HashMap>> + secondary-index-rebuilt-
//! under-the-same-lock shape used by the teacher's agent directory, adapted
//! from a load-once CSV import to live register/heartbeat/sweep mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use parking_lot::RwLock;
use ri_envelope::HeartbeatPayload;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::DEFAULT_QUEUE_CAPACITY;
use crate::manager::ConnectionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Registered,
    Online,
    Stale,
    Offline,
}

impl AgentState {
    const ALL: [AgentState; 4] =
        [AgentState::Registered, AgentState::Online, AgentState::Stale, AgentState::Offline];

    fn label(self) -> &'static str {
        match self {
            AgentState::Registered => "registered",
            AgentState::Online => "online",
            AgentState::Stale => "stale",
            AgentState::Offline => "offline",
        }
    }
}

/// Immutable-on-register fields supplied by an Agent's `POST /ri/register`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: String,
    pub version: String,
    pub capabilities: HashSet<String>,
    pub max_concurrency: u32,
    pub labels: HashMap<String, String>,
}

/// The Registry's record for a single Agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: String,
    pub version: String,
    pub capabilities: HashSet<String>,
    pub max_concurrency: u32,
    pub labels: HashMap<String, String>,
    pub state: AgentState,
    pub last_heartbeat: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
    pub load: f64,
    pub inflight: u32,
}

impl AgentInfo {
    fn from_registration(reg: Registration, now: DateTime<Utc>) -> Self {
        Self {
            id: reg.id,
            version: reg.version,
            capabilities: reg.capabilities,
            max_concurrency: reg.max_concurrency,
            labels: reg.labels,
            state: AgentState::Registered,
            last_heartbeat: now,
            connected_at: now,
            load: 0.0,
            inflight: 0,
        }
    }

    fn has_spare_concurrency(&self) -> bool {
        self.inflight < self.max_concurrency
    }

    fn is_selectable(&self) -> bool {
        matches!(self.state, AgentState::Online | AgentState::Registered) && self.has_spare_concurrency()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub queue_capacity: usize,
    pub sweep_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub stale_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(25),
            stale_timeout: Duration::from_secs(60),
        }
    }
}

/// Owns Agent metadata, the capability index, and the Connection Manager,
/// and runs the background health sweeper.
pub struct Registry {
    config: RegistryConfig,
    agents: RwLock<HashMap<String, AgentInfo>>,
    capability_index: RwLock<HashMap<String, HashSet<String>>>,
    connections: Arc<ConnectionManager>,
    sweep_cancel: CancellationToken,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            agents: RwLock::new(HashMap::new()),
            capability_index: RwLock::new(HashMap::new()),
            connections: Arc::new(ConnectionManager::new()),
            sweep_cancel: CancellationToken::new(),
        })
    }

    pub fn connections(&self) -> Arc<ConnectionManager> {
        self.connections.clone()
    }

    /// Token that [`stop_sweep`](Self::stop_sweep) cancels; pass this to
    /// [`run_health_sweep`](Self::run_health_sweep) so the two agree on the
    /// same shutdown signal.
    pub fn sweep_cancellation(&self) -> CancellationToken {
        self.sweep_cancel.clone()
    }

    /// Register (or re-register) an Agent. Re-registration under the same id
    /// atomically replaces both the metadata record and the Connection.
    pub fn register(&self, registration: Registration) -> AgentInfo {
        let now = Utc::now();
        let id = registration.id.clone();
        let capabilities = registration.capabilities.clone();
        let info = AgentInfo::from_registration(registration, now);

        self.agents.write().insert(id.clone(), info.clone());
        self.index_capabilities(&id, &capabilities);
        self.connections.register(&id, self.config.queue_capacity);
        self.record_state_gauges();

        info!(agent_id = %id, capabilities = ?capabilities, "agent registered");
        info
    }

    /// Remove the Agent and its Connection outright (administrative
    /// operation, no HTTP route names it — completes the unregister leg of
    /// the AgentInfo lifecycle).
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.agents.write().remove(id).is_some();
        if removed {
            self.deindex_capabilities(id);
            self.connections.remove(id);
            self.record_state_gauges();
            info!(agent_id = %id, "agent unregistered");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<AgentInfo> {
        self.agents.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn total_inflight(&self) -> u32 {
        self.agents.read().values().map(|a| a.inflight).sum()
    }

    /// Refresh `last_heartbeat`/`load`/`inflight` and advance the health
    /// state machine. Returns `false` if `id` is unknown.
    pub fn update_heartbeat(&self, id: &str, heartbeat: &HeartbeatPayload) -> bool {
        use ri_envelope::HeartbeatStatus::*;

        {
            let mut agents = self.agents.write();
            let Some(agent) = agents.get_mut(id) else {
                return false;
            };

            agent.last_heartbeat = Utc::now();
            agent.load = heartbeat.load;
            agent.inflight = heartbeat.inflight;

            agent.state = match (agent.state, heartbeat.status) {
                (AgentState::Offline, _) => AgentState::Offline, // no-op; re-register required
                (_, Ok) => AgentState::Online,
                (AgentState::Stale, Degraded) => AgentState::Stale,
                (_, Degraded) => AgentState::Stale,
            };
        }

        self.record_state_gauges();
        true
    }

    /// Filter to Agents advertising `capability`, selectable (ONLINE or
    /// REGISTERED, with spare concurrency), and pick the one with the
    /// lowest load. Ties break on iteration order.
    pub fn select_agent(&self, capability: &str) -> Option<AgentInfo> {
        let candidate_ids = self.capability_index.read().get(capability).cloned()?;
        let agents = self.agents.read();

        candidate_ids
            .iter()
            .filter_map(|id| agents.get(id))
            .filter(|agent| agent.is_selectable())
            .min_by(|a, b| a.load.partial_cmp(&b.load).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
    }

    fn index_capabilities(&self, id: &str, capabilities: &HashSet<String>) {
        let mut index = self.capability_index.write();
        // Re-registration: drop any stale entries for this id before
        // re-adding under the (possibly different) capability set.
        for ids in index.values_mut() {
            ids.remove(id);
        }
        for capability in capabilities {
            index.entry(capability.clone()).or_default().insert(id.to_string());
        }
    }

    fn deindex_capabilities(&self, id: &str) {
        let mut index = self.capability_index.write();
        for ids in index.values_mut() {
            ids.remove(id);
        }
        index.retain(|_, ids| !ids.is_empty());
    }

    /// Run the periodic health sweep until `shutdown` resolves. Each tick:
    /// STALE for longer than `stale_timeout` → OFFLINE (and Connection
    /// removed); ONLINE for longer than `heartbeat_timeout` → STALE.
    pub async fn run_health_sweep(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("health sweep stopping on shutdown signal");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }
    }

    fn sweep_once(&self) {
        let now = Utc::now();
        let mut to_offline = Vec::new();

        {
            let mut agents = self.agents.write();
            for agent in agents.values_mut() {
                if agent.state == AgentState::Offline {
                    continue;
                }
                let elapsed = (now - agent.last_heartbeat)
                    .to_std()
                    .unwrap_or(Duration::ZERO);

                if elapsed > self.config.stale_timeout {
                    agent.state = AgentState::Offline;
                    to_offline.push(agent.id.clone());
                } else if elapsed > self.config.heartbeat_timeout && agent.state == AgentState::Online {
                    agent.state = AgentState::Stale;
                    debug!(agent_id = %agent.id, "agent demoted to STALE");
                }
            }
        }

        for id in to_offline {
            info!(agent_id = %id, "agent transitioned to OFFLINE, removing connection");
            self.connections.remove(&id);
        }
        self.record_state_gauges();
    }

    pub fn stop_sweep(&self) {
        self.sweep_cancel.cancel();
    }

    /// Recompute the per-state agent gauges exposed on `/metrics`. Called
    /// after every mutation of `agents` that can change a state.
    fn record_state_gauges(&self) {
        let agents = self.agents.read();
        for state in AgentState::ALL {
            let count = agents.values().filter(|agent| agent.state == state).count();
            gauge!("registry_agents_in_state", count as f64, "state" => state.label());
        }
    }
}
