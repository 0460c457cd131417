//! Saved song lists.
//!
//! One line per song: `library<<<filename<<<semitones<<<steps<<<durationMs`.
//! Songs are stored relative to a named library so a list survives the
//! library moving on disk.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{HistoryError, HistoryResult, FIELD_SEPARATOR};
use crate::models::{ShiftControls, Track};

/// Library name to root folder.
pub type LibraryMap = HashMap<String, PathBuf>;

/// One saved list line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub library: String,
    pub file_name: String,
    pub semitones: i32,
    pub tempo_steps: i32,
    pub duration_ms: u64,
}

impl ListEntry {
    pub fn from_track(track: &Track) -> Self {
        let controls = track.controls();
        Self {
            library: track.library().unwrap_or_default().to_string(),
            file_name: track.file_name(),
            semitones: controls.semitones,
            tempo_steps: controls.tempo_steps,
            duration_ms: track.duration_ms(),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{lib}{sep}{name}{sep}{key}{sep}{tempo}{sep}{dur}",
            lib = self.library,
            name = self.file_name,
            key = self.semitones,
            tempo = self.tempo_steps,
            dur = self.duration_ms,
            sep = FIELD_SEPARATOR
        )
    }

    /// Parse a list line. Lines with fewer than five fields are rejected;
    /// unparseable numbers read as zero.
    pub fn parse_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR).collect();
        if parts.len() < 5 {
            return None;
        }
        Some(Self {
            library: parts[0].to_string(),
            file_name: parts[1].to_string(),
            semitones: parts[2].trim().parse().unwrap_or(0),
            tempo_steps: parts[3].trim().parse().unwrap_or(0),
            duration_ms: parts[4].trim().parse().unwrap_or(0),
        })
    }
}

/// Load a saved list as fresh tracks.
///
/// Entries whose library is unknown or whose file no longer exists are
/// skipped. Entries without a stored duration are measured with `duration_of`.
pub fn load_list(
    path: &Path,
    libraries: &LibraryMap,
    duration_of: &dyn Fn(&Path) -> Option<u64>,
) -> HistoryResult<Vec<Track>> {
    let content = fs::read_to_string(path).map_err(|e| HistoryError::io(path, e))?;
    let mut tracks = Vec::new();

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let Some(entry) = ListEntry::parse_line(line) else {
            tracing::warn!("Skipping malformed list line: {}", line);
            continue;
        };
        let Some(root) = libraries.get(&entry.library) else {
            tracing::warn!(
                "Skipping {}: unknown library '{}'",
                entry.file_name,
                entry.library
            );
            continue;
        };

        let file = root.join(&entry.file_name);
        if !file.is_file() {
            tracing::warn!("Skipping missing file: {}", file.display());
            continue;
        }
        let Some(track) = Track::from_path(&file) else {
            tracing::warn!("Skipping unsupported file: {}", file.display());
            continue;
        };

        let duration_ms = if entry.duration_ms > 0 {
            entry.duration_ms
        } else {
            duration_of(&file).unwrap_or(0)
        };

        tracks.push(
            track
                .with_library(entry.library)
                .with_duration_ms(duration_ms)
                .with_controls(ShiftControls::new(entry.semitones, entry.tempo_steps)),
        );
    }

    tracing::info!("Loaded {} songs from {}", tracks.len(), path.display());
    Ok(tracks)
}

/// Save `tracks` as a list at `path`, replacing it atomically.
pub fn save_list<'a>(path: &Path, tracks: impl IntoIterator<Item = &'a Track>) -> HistoryResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| HistoryError::io(parent, e))?;
        }
    }

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(|e| HistoryError::io(&tmp, e))?;
        for track in tracks {
            writeln!(file, "{}", ListEntry::from_track(track).to_line())
                .map_err(|e| HistoryError::io(&tmp, e))?;
        }
        file.sync_all().map_err(|e| HistoryError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| HistoryError::io(path, e))?;

    tracing::info!("Saved list to {}", path.display());
    Ok(())
}
