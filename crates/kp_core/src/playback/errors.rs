//! Playback error type.

use thiserror::Error;

use super::engine::EngineRole;

/// A media engine failed to open or decode its source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Playback error on {engine} engine: {message}")]
pub struct PlaybackError {
    pub engine: EngineRole,
    pub message: String,
}

impl PlaybackError {
    pub fn new(engine: EngineRole, message: impl Into<String>) -> Self {
        Self {
            engine,
            message: message.into(),
        }
    }
}
