//! Error types for the stream module.

use thiserror::Error;

use tweetwatch_core::RuleError;

use crate::session::SessionState;

/// Errors that can occur during rule synchronization and streaming.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Packing or rule editing failed (capacity, handle length).
    #[error(transparent)]
    Rules(#[from] RuleError),

    /// The remote service could not be reached or failed server-side.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote service refused the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// A remote call did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The remote service sent something we could not decode.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Reading the target list failed.
    #[error("store error: {0}")]
    Store(#[from] tweetwatch_store::StoreError),

    /// `start` was called while the session is already active.
    #[error("session already active ({0})")]
    AlreadyRunning(SessionState),

    /// The operation needs a streaming session.
    #[error("session is not streaming ({0})")]
    NotStreaming(SessionState),

    /// The operation was cancelled by `stop`.
    #[error("cancelled")]
    Cancelled,
}

impl StreamError {
    /// Whether the error is a rule capacity rejection.
    pub fn is_capacity(&self) -> bool {
        matches!(self, StreamError::Rules(e) if e.is_capacity())
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
