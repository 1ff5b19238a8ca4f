//! HTTP ingress (component C7): Agent long-poll endpoints and the platform
//! webhook front door, wired together over the Registry/Event Bus/Adapter
//! core.

mod error;
mod handlers;
mod router;
mod state;
mod webhook;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
