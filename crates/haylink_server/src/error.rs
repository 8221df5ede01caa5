//! Error types for the reference server.

use haylink_engine::SyncError;
use haylink_protocol::EntityRef;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server is switched off.
    #[error("server offline")]
    Offline,

    /// No entity with this id.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityRef),

    /// The nav id has no children on this server.
    #[error("unknown nav id: {0}")]
    UnknownNav(String),

    /// The watch id is not open (never opened, closed or expired).
    #[error("unknown watch: {0}")]
    UnknownWatch(String),

    /// The entity does not declare this action.
    #[error("unknown action {action} on {id}")]
    UnknownAction {
        /// Target entity.
        id: EntityRef,
        /// Requested action.
        action: String,
    },

    /// Too many watches are open.
    #[error("watch limit reached: {0}")]
    TooManyWatches(usize),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Offline | ServerError::TooManyWatches(_))
    }
}

impl From<ServerError> for SyncError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(message) => SyncError::InvalidRequest(message),
            ServerError::AuthenticationFailed(message) => SyncError::AuthenticationFailed(message),
            ServerError::Offline => SyncError::transport_retryable("server offline"),
            ServerError::UnknownEntity(id) => SyncError::InvalidRequest(format!("unknown entity {id}")),
            ServerError::UnknownNav(nav_id) => SyncError::NavUnsupported(nav_id),
            ServerError::UnknownWatch(watch_id) => SyncError::WatchExpired(watch_id),
            ServerError::UnknownAction { id, action } => SyncError::UnknownAction {
                id: id.to_string(),
                action,
            },
            err @ ServerError::TooManyWatches(_) => SyncError::ServerError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Offline.is_server_error());
        assert!(!ServerError::UnknownWatch("w".into()).is_server_error());
    }

    #[test]
    fn maps_to_engine_errors() {
        assert!(SyncError::from(ServerError::UnknownNav("x".into())).is_nav_unsupported());
        assert!(SyncError::from(ServerError::Offline).is_retryable());
        assert!(matches!(
            SyncError::from(ServerError::UnknownWatch("w-1".into())),
            SyncError::WatchExpired(id) if id == "w-1"
        ));
        let err = SyncError::from(ServerError::UnknownAction {
            id: EntityRef::new("p"),
            action: "reset".into(),
        });
        assert!(err.is_user_error());
        assert!(err.to_string().contains("@p"));
    }
}
