//! Error types for the sync core.

use thiserror::Error;

/// Errors that can occur while reconciling a source calendar into a destination.
///
/// `MalformedEvent`, `InvalidToken` and `NotFound` are recovered by the
/// reconciler. Everything else aborts the sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Sync token rejected by {0}")]
    InvalidToken(String),

    #[error("Destination event not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, SyncError::InvalidToken(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
