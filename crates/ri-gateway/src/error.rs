use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ri_bus::BrokerError;
use ri_envelope::ErrorPayload;

/// Wraps [`BrokerError`] (plus ingress-only failure modes it doesn't cover)
/// and converts it to an HTTP response at the gateway edge, per the
/// kind→surface table: decode/shape errors to 400, auth failures to 401,
/// unknown agent/platform to 404/501, dispatch failures to 500.
#[derive(Debug)]
pub struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self(BrokerError::MalformedRequest(message.into()))
    }

    pub fn unknown_agent(id: impl Into<String>) -> Self {
        Self(BrokerError::UnknownAgent(id.into()))
    }

    pub fn unsupported_platform(platform: impl Into<String>) -> Self {
        Self(BrokerError::UnsupportedPlatform(platform.into()))
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            BrokerError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            BrokerError::AuthFailed => StatusCode::UNAUTHORIZED,
            BrokerError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            BrokerError::UnsupportedPlatform(_) => StatusCode::NOT_IMPLEMENTED,
            BrokerError::NoAgentAvailable
            | BrokerError::NoConnection
            | BrokerError::QueueFull
            | BrokerError::ResponseTimeout => StatusCode::INTERNAL_SERVER_ERROR,
            BrokerError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = ErrorPayload { code: self.0.code().to_string(), message: self.0.to_string() };
        (status, Json(payload)).into_response()
    }
}
