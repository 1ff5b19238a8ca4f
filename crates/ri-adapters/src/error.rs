use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("request is missing a required field: {0}")]
    MissingField(&'static str),
}
