use chorus_client::ClientError;
use chorus_common::PayloadError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Comment must not be empty")]
    EmptyComment,

    /// The request was rejected or never reached the server. The feed is
    /// left as it was.
    #[error("Request failed: {0}")]
    Request(ClientError),

    /// A response or push frame did not carry a usable post.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl From<ClientError> for EngineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Parse(msg) => EngineError::Malformed(msg),
            ClientError::Channel(msg) => EngineError::Channel(msg),
            other => EngineError::Request(other),
        }
    }
}

impl From<PayloadError> for EngineError {
    fn from(err: PayloadError) -> Self {
        EngineError::Malformed(err.to_string())
    }
}
