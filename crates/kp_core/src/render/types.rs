//! Render requests, results, and the messages a worker sends back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::RenderError;
use crate::models::{ContainerKind, ShiftControls, Track, TrackId};

/// What to do with a track once its render completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderIntent {
    /// Append to the queue (or start it when nothing is loaded).
    AppendToQueue,
    /// Replace the current track and play it immediately.
    PromoteAndPlay,
}

/// A queued render of one track.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    track: Track,
    intent: RenderIntent,
}

impl RenderRequest {
    /// Request a render of `track` at its current controls.
    ///
    /// Returns `None` when the controls are default.
    pub fn new(track: Track, intent: RenderIntent) -> Option<Self> {
        if track.controls().is_default() {
            return None;
        }
        Some(Self { track, intent })
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn track_mut(&mut self) -> &mut Track {
        &mut self.track
    }

    pub fn into_track(self) -> Track {
        self.track
    }

    pub fn intent(&self) -> RenderIntent {
        self.intent
    }

    pub fn pitch_factor(&self) -> f64 {
        self.track.controls().pitch_factor()
    }

    pub fn tempo_factor(&self) -> f64 {
        self.track.controls().tempo_factor()
    }

    /// Immutable snapshot handed to the worker thread.
    pub fn job(&self) -> RenderJob {
        RenderJob::from_track(&self.track)
    }
}

/// Everything a worker needs to render one track.
///
/// Built from a snapshot of the track so the worker never touches queue
/// state.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub track: TrackId,
    pub source_path: PathBuf,
    pub audio_source: PathBuf,
    pub container: ContainerKind,
    pub controls: ShiftControls,
}

impl RenderJob {
    pub fn from_track(track: &Track) -> Self {
        Self {
            track: track.id(),
            source_path: track.source_path().to_path_buf(),
            audio_source: track.audio_source(),
            container: track.container(),
            controls: track.controls(),
        }
    }

    /// Name used for the render log file.
    pub fn job_name(&self) -> String {
        let stem = self
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "render".to_string());
        match self.controls.suffix() {
            Some(suffix) => format!("{}_{}", stem, suffix),
            None => stem,
        }
    }
}

/// Successful render outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    /// Both factors were 1; nothing was rendered.
    NoOp,
    /// The asset was already in the cache.
    CacheHit(PathBuf),
    /// The asset was rendered into the cache.
    Rendered(PathBuf),
}

impl RenderOutput {
    pub fn path(&self) -> Option<&Path> {
        match self {
            RenderOutput::NoOp => None,
            RenderOutput::CacheHit(p) | RenderOutput::Rendered(p) => Some(p),
        }
    }
}

/// Progress snapshot of a running render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProgress {
    pub percent: u32,
    pub seconds_remaining: u64,
}

/// Message from a worker thread to the coordinator.
#[derive(Debug)]
pub enum RenderMessage {
    Progress {
        track: TrackId,
        progress: RenderProgress,
    },
    Done {
        track: TrackId,
        result: Result<RenderOutput, RenderError>,
    },
}

/// Handle for cancelling a running render or silence scan.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// A render stops at the next transcoder output line, a decode at the
    /// next chunk of samples.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_controls_need_no_request() {
        let t = Track::new("/m/a.mp4", ContainerKind::GenericVideo);
        assert!(RenderRequest::new(t.clone(), RenderIntent::AppendToQueue).is_none());

        let t = t.with_controls(ShiftControls::new(0, 2));
        let req = RenderRequest::new(t, RenderIntent::PromoteAndPlay).unwrap();
        assert_eq!(req.pitch_factor(), 1.0);
        assert!((req.tempo_factor() - 1.1).abs() < 1e-12);
        assert_eq!(req.job().job_name(), "a_Tempo10");
    }

    #[test]
    fn cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
