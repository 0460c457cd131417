//! Key/tempo render pipeline.
//!
//! - [`ShiftRenderWorker`] runs one transcode into the render cache
//! - [`RenderCoordinator`] serializes requests and applies results to the
//!   queue

mod coordinator;
mod errors;
mod types;
mod worker;

pub use coordinator::{CoordinatorState, RenderCoordinator, RenderEvent};
pub use errors::{RenderError, RenderResult};
pub use types::{
    CancelHandle, RenderIntent, RenderJob, RenderMessage, RenderOutput, RenderProgress, RenderRequest,
};
pub use worker::ShiftRenderWorker;
