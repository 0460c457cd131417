//! Core enums used throughout the application.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// File extensions the player accepts, lowercase with leading dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".mp4", ".mkv", ".avi", ".cdg"];

/// How a track's media is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerKind {
    /// A single video container carrying both picture and audio.
    GenericVideo,
    /// A graphics-only file paired with an audio file of the same stem.
    SidecarGraphics,
}

impl ContainerKind {
    /// Detect the container kind from a file extension (case-insensitive).
    ///
    /// Returns `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "mkv" | "avi" => Some(ContainerKind::GenericVideo),
            "cdg" => Some(ContainerKind::SidecarGraphics),
            _ => None,
        }
    }

    /// Whether the transcoder can rewrite this container in place
    /// (video stream kept, audio replaced).
    pub fn is_remuxable(&self) -> bool {
        matches!(self, ContainerKind::GenericVideo)
    }

    /// Extension of the sidecar audio file, if this kind has one.
    pub fn sidecar_audio_extension(&self) -> Option<&'static str> {
        match self {
            ContainerKind::GenericVideo => None,
            ContainerKind::SidecarGraphics => Some("mp3"),
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::GenericVideo => write!(f, "generic-video"),
            ContainerKind::SidecarGraphics => write!(f, "sidecar-graphics"),
        }
    }
}

/// Render status of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderState {
    /// No render outstanding; the track may be played.
    #[default]
    Idle,
    /// Waiting in the render backlog.
    Pending,
    /// The active render job is working on this track.
    Rendering,
}

impl RenderState {
    /// Whether a render is outstanding (pending or active).
    pub fn is_busy(&self) -> bool {
        !matches!(self, RenderState::Idle)
    }
}
