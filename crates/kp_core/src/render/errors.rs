//! Error types for the render pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of one key/tempo render.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The source (or its sidecar audio) is gone.
    #[error("Original file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    /// Duration could not be determined, so progress cannot be tracked.
    #[error("Failed to get media duration for {0}")]
    ProbeFailed(String),

    /// The transcoder exited unsuccessfully.
    #[error("{tool} failed during key/tempo change (exit code {}): {message}", exit_code_label(.exit_code))]
    TranscodeFailed {
        tool: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// The render was cancelled before it finished.
    #[error("Key/tempo change was cancelled")]
    Cancelled,

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl RenderError {
    /// Create a transcode failed error.
    pub fn transcode_failed(
        tool: impl Into<String>,
        exit_code: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::TranscodeFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
