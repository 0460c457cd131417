//! Synchronized dual-stream playback.

mod engine;
mod errors;
mod idle;
mod synchronizer;

pub use engine::{ClockEngine, DurationLookup, EngineEvent, EngineRole, EngineState, PlaybackEngine};
pub use errors::PlaybackError;
pub use idle::IdleRotation;
pub use synchronizer::{AssetPair, Correction, PlaybackSynchronizer, SyncNotice, SyncState};
