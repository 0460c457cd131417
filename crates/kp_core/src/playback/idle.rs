//! Idle clip rotation.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rand::Rng;

/// Ambient clips shown while the queue is empty.
#[derive(Debug, Clone, Default)]
pub struct IdleRotation {
    clips: Vec<PathBuf>,
    current: Option<PathBuf>,
}

impl IdleRotation {
    /// Scan `folder` for `.mp4` clips, starting with `default_name` if it
    /// is present and with the first clip otherwise.
    pub fn scan(folder: &Path, default_name: &str) -> Self {
        let mut clips: Vec<PathBuf> = match fs::read_dir(folder) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Cannot read idle folder {}: {}", folder.display(), e);
                Vec::new()
            }
        };
        clips.sort();
        tracing::debug!("Found {} idle clips in {}", clips.len(), folder.display());
        Self::from_clips(clips, default_name)
    }

    pub fn from_clips(clips: Vec<PathBuf>, default_name: &str) -> Self {
        let current = clips
            .iter()
            .find(|p| p.file_name().is_some_and(|n| n == default_name))
            .or_else(|| clips.first())
            .cloned();
        Self { clips, current }
    }

    pub fn clips(&self) -> &[PathBuf] {
        &self.clips
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Switch to a random clip other than the current one.
    ///
    /// Returns `None` when there is nothing else to switch to.
    pub fn next_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<&Path> {
        let candidates: Vec<&PathBuf> = self
            .clips
            .iter()
            .filter(|p| Some(p.as_path()) != self.current.as_deref())
            .collect();
        let next = (*candidates.choose(rng)?).clone();
        self.current = Some(next);
        self.current.as_deref()
    }
}
