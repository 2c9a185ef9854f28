use thiserror::Error;

/// A response body or push frame that does not carry a usable `Post`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Invalid JSON payload: {0}")]
    Json(String),

    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        PayloadError::Json(err.to_string())
    }
}
