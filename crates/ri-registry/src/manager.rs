//! Registry of per-Agent [`Connection`]s, keyed by Agent id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ri_envelope::Envelope;
use tracing::debug;

use crate::connection::Connection;

/// Maps Agent id to its live [`Connection`]. Registration under an id that
/// already has a Connection atomically replaces it; the old Connection is
/// closed first so its pollers wake with an empty batch instead of leaking.
#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh Connection for `id`, replacing (and closing) any prior
    /// one under the same id.
    pub fn register(&self, id: &str, queue_capacity: usize) -> Arc<Connection> {
        let fresh = Arc::new(Connection::new(queue_capacity));
        let previous = self
            .connections
            .write()
            .insert(id.to_string(), fresh.clone());
        if let Some(previous) = previous {
            debug!(agent_id = %id, "replacing existing connection on re-register");
            previous.close();
        }
        fresh
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Close and drop the Connection for `id`, if any.
    pub fn remove(&self, id: &str) {
        if let Some(conn) = self.connections.write().remove(id) {
            conn.close();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Best-effort fan-out: attempt `enqueue` on every live Connection,
    /// returning how many accepted it. Administrative primitive — not used
    /// by any of the core dispatch paths.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        self.connections
            .read()
            .values()
            .filter(|conn| conn.enqueue(envelope.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
