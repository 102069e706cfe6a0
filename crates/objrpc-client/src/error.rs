//! Client error types.

use objrpc::RpcError;
use thiserror::Error;

/// Errors surfaced by [`Connection`](crate::Connection) and
/// [`RemoteProxy`](crate::RemoteProxy).
///
/// `NotFound` and `CallFailed` carry the server's error text, so callers can
/// tell a missing attribute from a failed call from a broken transport.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered 404: unknown attribute or expired reference.
    #[error("{body}")]
    NotFound { body: String },

    /// The server answered 400: not callable, bad arguments, or the call raised.
    #[error("{body}")]
    CallFailed { body: String },

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error(transparent)]
    Protocol(#[from] RpcError),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ClientError {
    /// Map a non-200 response to its error kind.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => ClientError::NotFound { body },
            400 => ClientError::CallFailed { body },
            _ => ClientError::Status { status, body },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_call_failed(&self) -> bool {
        matches!(self, ClientError::CallFailed { .. })
    }
}
