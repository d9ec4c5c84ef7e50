//! Error types for backend calls.

/// Failure talking to the backend status API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Backend did not answer in time")]
    Timeout,

    #[error("Backend returned HTTP {0}")]
    Status(u16),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Backend request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_decode() {
            ClientError::MalformedResponse(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
