//! Error types for queue operations.

use thiserror::Error;

use crate::models::TrackId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The track is not in the queue.
    #[error("Track {0} is not in the queue")]
    TrackNotFound(TrackId),

    /// The track cannot be played while its key/tempo change renders.
    #[error("'{0}' is still rendering")]
    TrackRendering(String),

    /// Internal bookkeeping went out of sync.
    #[error("Queue invariant violated: {0}")]
    InvariantViolation(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
