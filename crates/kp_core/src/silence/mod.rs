//! Silence boundary detection.
//!
//! Finds where a track's audio becomes audible and where it falls silent
//! for good, so sidecar tracks can advance as soon as the music is over.

mod detect;
mod scanner;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use detect::{find_bounds, FRAME_LENGTH, HOP_LENGTH, SCAN_SAMPLE_RATE, THRESHOLD_RATIO};
pub use scanner::{analyze, SilenceMessage, SilenceScanner};

/// Errors from a silence scan.
#[derive(Error, Debug)]
pub enum SilenceError {
    #[error("Audio file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Failed to extract audio from {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No audio samples in {0}")]
    NoSamples(PathBuf),

    #[error("Silence scan cancelled")]
    Cancelled,
}

pub type SilenceResult<T> = Result<T, SilenceError>;
