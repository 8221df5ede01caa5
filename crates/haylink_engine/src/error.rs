//! Error types for the sync engine.

use haylink_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while talking to the remote server.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// No connected client is available.
    #[error("not connected to server")]
    NotConnected,

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server does not support navigating the requested node.
    ///
    /// Navigation treats this as "stay unexpanded" rather than a failure.
    #[error("navigation unsupported: {0}")]
    NavUnsupported(String),

    /// The watch session is unknown to the server (expired or closed).
    #[error("watch expired: {0}")]
    WatchExpired(String),

    /// The requested action does not exist on the target entity.
    #[error("action {action} does not exist on {id}")]
    UnknownAction {
        /// Target entity.
        id: String,
        /// Requested action name.
        action: String,
    },

    /// The caller supplied invalid parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Server rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Malformed protocol value.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection was closed while the operation was pending.
    #[error("operation cancelled")]
    Cancelled,

    /// A background worker failed to complete.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }

    /// Returns true if navigation should leave the node unexpanded.
    pub fn is_nav_unsupported(&self) -> bool {
        matches!(self, SyncError::NavUnsupported(_))
    }

    /// Returns true if the error was caused by caller input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidRequest(_) | SyncError::UnknownAction { .. } | SyncError::Protocol(_)
        )
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            SyncError::Cancelled
        } else {
            SyncError::Worker(err.to_string())
        }
    }
}
