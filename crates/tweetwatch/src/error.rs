//! Error types for tweetwatch.

use thiserror::Error;

use tweetwatch_core::{EntityId, Handle, ValidationError};
use tweetwatch_store::StoreError;
use tweetwatch_stream::StreamError;

/// Errors from the external classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The request could not be sent or the connection failed.
    #[error("classifier request failed: {0}")]
    Request(String),

    /// The call did not complete in time.
    #[error("classifier timed out: {0}")]
    Timeout(String),

    /// The service asked us to slow down.
    #[error("classifier rate limited: {0}")]
    RateLimited(String),

    /// The service answered with an error status.
    #[error("classifier error {status}: {body}")]
    Status { status: u16, body: String },

    /// The response could not be understood.
    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

impl ClassifierError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifierError::Request(_)
            | ClassifierError::Timeout(_)
            | ClassifierError::RateLimited(_) => true,
            ClassifierError::Status { status, .. } => *status >= 500,
            ClassifierError::Malformed(_) => false,
        }
    }
}

/// Errors from notification delivery.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("notification rejected: {0}")]
    Rejected(String),

    #[error("notification channel closed")]
    Closed,
}

/// Errors from the matching pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The post's author is not tracked (e.g. a straggler after unsubscribe).
    #[error("unknown author: {0}")]
    UnknownAuthor(EntityId),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors from tracker commands.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("@{0} is already tracked")]
    AlreadyTracked(Handle),

    #[error("@{0} is not tracked")]
    NotTracked(Handle),

    #[error("no account named @{0}")]
    UserNotFound(Handle),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// The event channel has already been handed out.
    #[error("event channel already taken")]
    EventsTaken,
}

impl TrackerError {
    /// Whether the command was rejected for lack of rule capacity.
    pub fn is_capacity(&self) -> bool {
        matches!(self, TrackerError::Stream(e) if e.is_capacity())
    }
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
