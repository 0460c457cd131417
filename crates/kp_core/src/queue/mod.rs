//! Play queue and its coordination logic.

mod errors;
mod manager;
mod play_queue;

pub use errors::{QueueError, QueueResult};
pub use manager::{AddOutcome, PlaybackControl, QueueManager};
pub use play_queue::PlayQueue;
