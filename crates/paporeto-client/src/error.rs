use paporeto_store::StoreError;
use thiserror::Error;

/// A rejection from the hosted backend, carried unchanged to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The service answered with an error payload.
    #[error("{message} (status {status})")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
        details: Option<String>,
    },

    /// The request never got an answer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The answer did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Realtime error: {0}")]
    Realtime(String),
}

impl BackendError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        BackendError::Api {
            status,
            message: message.into(),
            code: None,
            details: None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// The operation needs a live backend and none is configured.
    #[error("Backend not configured: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No session is stored; the UI has been sent to `redirect`.
    #[error("Not authenticated (redirected to {redirect})")]
    NotAuthenticated { redirect: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
