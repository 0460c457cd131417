//! Media plumbing around the external transcoder.
//!
//! This module provides:
//! - Deterministic cache paths for shifted renders ([`AssetResolver`])
//! - Transcoder command planning ([`TranscodePlan`])
//! - Progress parsing from the transcoder's diagnostic stream
//! - Duration probing, tool discovery and cache maintenance
//! - The [`MediaToolkit`] seam the render worker runs against

pub mod cache;
pub mod progress;

mod probe;
mod resolver;
mod toolkit;
mod tools;
mod transcode;

pub use probe::{parse_probe_output, probe_duration_ms};
pub use resolver::AssetResolver;
pub use toolkit::{FfmpegToolkit, MediaToolkit, TranscodeProcess};
pub use tools::{locate_tool, MediaTools, ToolError};
pub use transcode::{CodecSettings, TranscodeMode, TranscodePlan};
