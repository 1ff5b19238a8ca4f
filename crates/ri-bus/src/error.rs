use thiserror::Error;

/// The full error taxonomy the broker core surfaces. Not every variant is
/// produced by the Event Bus itself (`MalformedRequest`, `AuthFailed`, and
/// `UnsupportedPlatform` originate at the HTTP ingress / adapter layer) —
/// they live here so `ri-gateway` has a single type to convert to a
/// response, matching the kind→surface table in the specification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("signature verification failed")]
    AuthFailed,
    #[error("unknown agent id: {0}")]
    UnknownAgent(String),
    #[error("no adapter registered for platform: {0}")]
    UnsupportedPlatform(String),
    #[error("no agent available for capability")]
    NoAgentAvailable,
    #[error("agent has no active connection")]
    NoConnection,
    #[error("event queue is full")]
    QueueFull,
    #[error("no response received within the timeout")]
    ResponseTimeout,
    #[error("request was cancelled")]
    Cancelled,
}

impl BrokerError {
    /// Stable machine-readable code, used as `ErrorPayload.code`.
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::MalformedRequest(_) => "MalformedRequest",
            BrokerError::AuthFailed => "AuthFailed",
            BrokerError::UnknownAgent(_) => "UnknownAgent",
            BrokerError::UnsupportedPlatform(_) => "UnsupportedPlatform",
            BrokerError::NoAgentAvailable => "NoAgentAvailable",
            BrokerError::NoConnection => "NoConnection",
            BrokerError::QueueFull => "QueueFull",
            BrokerError::ResponseTimeout => "ResponseTimeout",
            BrokerError::Cancelled => "Cancelled",
        }
    }
}
