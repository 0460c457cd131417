//! Track entity.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::controls::{ShiftControls, ShiftedAsset};
use super::enums::{ContainerKind, RenderState};
use super::metadata::{effective_duration_ms, parse_artist_title};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one queued occurrence of a track.
///
/// Queueing the same file twice yields two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(u64);

impl TrackId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        TrackId(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Silence boundaries of a track's audio, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceMarkers {
    /// First audible moment.
    pub intro_ms: u64,
    /// End of the last audible frame.
    pub outro_ms: u64,
}

/// A playable track.
///
/// `Clone` keeps the id (a snapshot of the same occurrence); use
/// [`Track::duplicate`] for a new queue entry of the same file.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    source_path: PathBuf,
    container: ContainerKind,
    duration_ms: u64,
    library: Option<String>,
    controls: ShiftControls,
    shifted: ShiftedAsset,
    render_state: RenderState,
    markers: Option<SilenceMarkers>,
}

impl Track {
    /// Create a track for `source_path` with an explicit container kind.
    pub fn new(source_path: impl Into<PathBuf>, container: ContainerKind) -> Self {
        Self {
            id: TrackId::next(),
            source_path: source_path.into(),
            container,
            duration_ms: 0,
            library: None,
            controls: ShiftControls::default(),
            shifted: ShiftedAsset::None,
            render_state: RenderState::Idle,
            markers: None,
        }
    }

    /// Create a track, detecting the container from the extension.
    ///
    /// Returns `None` for unsupported file types.
    pub fn from_path(source_path: impl Into<PathBuf>) -> Option<Self> {
        let source_path = source_path.into();
        let container = ContainerKind::from_path(&source_path)?;
        Some(Self::new(source_path, container))
    }

    /// Set the known duration (builder style).
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the owning library name (builder style).
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    /// Set the shift controls (builder style).
    pub fn with_controls(mut self, controls: ShiftControls) -> Self {
        self.set_controls(controls);
        self
    }

    /// A new queue occurrence of the same file, with a fresh id and no
    /// outstanding render.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = TrackId::next();
        copy.render_state = RenderState::Idle;
        copy
    }

    /// Stand-in for this occurrence that plays the unshifted source.
    ///
    /// Keeps the id so the queue entry and the loaded track still match.
    pub fn unshifted_placeholder(&self) -> Self {
        let mut copy = self.clone();
        copy.controls = ShiftControls::default();
        copy.shifted = ShiftedAsset::None;
        copy.render_state = RenderState::Idle;
        copy
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Bare filename of the source.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Filename without extension.
    pub fn stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> String {
        self.source_path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn container(&self) -> ContainerKind {
        self.container
    }

    pub fn is_sidecar(&self) -> bool {
        self.container == ContainerKind::SidecarGraphics
    }

    /// Sidecar audio path (same stem), whether or not it exists.
    pub fn sidecar_audio_path(&self) -> Option<PathBuf> {
        self.container
            .sidecar_audio_extension()
            .map(|ext| self.source_path.with_extension(ext))
    }

    /// The file carrying this track's audio.
    ///
    /// Sidecar tracks use their audio file when present and fall back to
    /// the source path otherwise.
    pub fn audio_source(&self) -> PathBuf {
        match self.sidecar_audio_path() {
            Some(audio) if audio.exists() => audio,
            _ => self.source_path.clone(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn set_duration_ms(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Duration as heard at the current tempo.
    pub fn effective_duration_ms(&self) -> u64 {
        effective_duration_ms(self.duration_ms, self.controls.tempo_factor())
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn controls(&self) -> ShiftControls {
        self.controls
    }

    /// Replace the shift controls, with tempo clamped to the supported
    /// range.
    ///
    /// Any change drops the attached rendered asset.
    pub fn set_controls(&mut self, controls: ShiftControls) {
        let controls = controls.clamped();
        if controls != self.controls {
            self.controls = controls;
            self.shifted = ShiftedAsset::None;
        }
    }

    /// Adjust the key by `delta` semitones.
    pub fn shift_key(&mut self, delta: i32) {
        let mut c = self.controls;
        c.semitones += delta;
        self.set_controls(c);
    }

    /// Adjust the tempo by `delta` steps.
    pub fn shift_tempo(&mut self, delta: i32) {
        let mut c = self.controls;
        c.tempo_steps += delta;
        self.set_controls(c);
    }

    pub fn shifted(&self) -> &ShiftedAsset {
        &self.shifted
    }

    /// Attach a rendered asset. Ignored while the controls are default.
    pub fn set_shifted(&mut self, asset: ShiftedAsset) {
        if self.controls.is_default() {
            self.shifted = ShiftedAsset::None;
        } else {
            self.shifted = asset;
        }
    }

    pub fn render_state(&self) -> RenderState {
        self.render_state
    }

    pub fn set_render_state(&mut self, state: RenderState) {
        self.render_state = state;
    }

    /// Whether a render is pending or running for this track.
    pub fn is_rendering(&self) -> bool {
        self.render_state.is_busy()
    }

    pub fn markers(&self) -> Option<SilenceMarkers> {
        self.markers
    }

    pub fn set_markers(&mut self, markers: SilenceMarkers) {
        self.markers = Some(markers);
    }

    /// `(artist, title)` parsed from the filename.
    pub fn artist_title(&self) -> (String, String) {
        parse_artist_title(&self.file_name())
    }
}
