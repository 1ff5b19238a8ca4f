//! Capability-indexed Agent registry: health lifecycle, per-Agent long-poll
//! connections, and selection policy (components C2–C4 of the broker core).

mod connection;
mod manager;
mod registry;

pub use connection::{Connection, DEFAULT_QUEUE_CAPACITY};
pub use manager::ConnectionManager;
pub use registry::{AgentInfo, AgentState, Registration, Registry, RegistryConfig};
