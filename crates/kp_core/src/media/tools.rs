//! Locating the transcoder and probe binaries.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::RenderSettings;

/// A required external tool could not be found.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} not found (configured as '{configured}'); install it or set its path in [render]")]
    NotFound { tool: String, configured: String },
}

/// Resolved paths of the external media tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl MediaTools {
    /// Locate both tools from the render settings.
    pub fn locate(settings: &RenderSettings) -> Result<Self, ToolError> {
        Ok(Self {
            ffmpeg: locate_tool("ffmpeg", &settings.ffmpeg_path)?,
            ffprobe: locate_tool("ffprobe", &settings.ffprobe_path)?,
        })
    }

    /// Use the configured names as-is, without checking they exist.
    pub fn unchecked(settings: &RenderSettings) -> Self {
        Self {
            ffmpeg: PathBuf::from(&settings.ffmpeg_path),
            ffprobe: PathBuf::from(&settings.ffprobe_path),
        }
    }
}

/// Resolve one tool.
///
/// Lookup order: the configured value as a path, the configured value on
/// `PATH`, then common install locations.
pub fn locate_tool(tool: &str, configured: &str) -> Result<PathBuf, ToolError> {
    let configured_path = Path::new(configured);
    if configured_path.components().count() > 1 && configured_path.is_file() {
        tracing::debug!("Using configured {}: {}", tool, configured_path.display());
        return Ok(configured_path.to_path_buf());
    }

    if let Ok(path) = which::which(configured) {
        tracing::debug!("Using {} from PATH: {}", tool, path.display());
        return Ok(path);
    }

    let common = [
        PathBuf::from("/usr/local/bin").join(tool),
        PathBuf::from("/usr/bin").join(tool),
        PathBuf::from("/opt/homebrew/bin").join(tool),
    ];
    for path in common {
        if path.is_file() {
            tracing::debug!("Using {}: {}", tool, path.display());
            return Ok(path);
        }
    }

    Err(ToolError::NotFound {
        tool: tool.to_string(),
        configured: configured.to_string(),
    })
}
