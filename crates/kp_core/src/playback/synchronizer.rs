//! Dual-stream playback synchronizer.
//!
//! The primary engine shows the visual stream and the secondary engine
//! plays the audio stream. A periodic correction pass keeps them aligned:
//! - Video tracks: the secondary is snapped to the primary when they drift
//!   apart by more than the tolerance
//! - Sidecar graphics tracks: the graphics engine has no audio clock, so
//!   only its playback rate is enforced
//!
//! An optional mirror engine (second screen) follows the primary.

use std::path::{Path, PathBuf};
use std::time::Instant;

use super::engine::{EngineEvent, EngineRole, EngineState, PlaybackEngine};
use super::errors::PlaybackError;
use crate::config::PlaybackSettings;
use crate::media::AssetResolver;
use crate::models::{effective_duration_ms, ShiftKind, SilenceMarkers, Track, TrackId};
use crate::queue::PlaybackControl;

/// Rates closer than this are considered equal.
const RATE_EPSILON: f64 = 1e-4;

/// Synchronizer state.
///
/// There is no loading state: `load` sets both sources synchronously, so a
/// track goes straight from `Stopped` to `Playing`. `Idle` is the ambient
/// loop shown while the queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Stopped,
    Playing,
    Paused,
    /// Looping the idle clip.
    Idle,
}

/// Sources and rates loaded for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPair {
    pub primary: PathBuf,
    pub secondary: PathBuf,
    pub primary_rate: f64,
    pub secondary_rate: f64,
    /// Whether a rendered key/tempo asset is in use.
    pub shifted: bool,
}

impl AssetPair {
    /// Decide what to load for `track`.
    ///
    /// - Sidecar with a rendered asset: graphics on the primary at the
    ///   tempo rate, rendered audio on the secondary
    /// - Video with a rendered asset: the asset on both at normal rate
    /// - Otherwise the original sources, both at the tempo rate
    pub fn for_track(track: &Track, resolver: &AssetResolver) -> Self {
        let controls = track.controls();
        let tempo = controls.tempo_factor();
        let rendered = track
            .shifted()
            .path()
            .filter(|p| p.is_file())
            .map(Path::to_path_buf)
            .or_else(|| resolver.cached(track));

        match rendered {
            Some(asset) if track.is_sidecar() => Self {
                primary: track.source_path().to_path_buf(),
                secondary: asset,
                primary_rate: if controls.tempo_steps != 0 { tempo } else { 1.0 },
                secondary_rate: 1.0,
                shifted: true,
            },
            Some(asset) => Self {
                primary: asset.clone(),
                secondary: asset,
                primary_rate: 1.0,
                secondary_rate: 1.0,
                shifted: true,
            },
            None => Self {
                primary: track.source_path().to_path_buf(),
                secondary: track.audio_source(),
                primary_rate: tempo,
                secondary_rate: tempo,
                shifted: false,
            },
        }
    }
}

/// A corrective write made by [`PlaybackSynchronizer::correct_drift`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    SnappedSecondary { drift_ms: u64 },
    ResetPrimaryRate { from: f64 },
    SnappedMirror { drift_ms: u64 },
}

/// Something the session must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    /// The loaded track played to its end.
    TrackEnded(TrackId),
    /// The loaded track failed to play. Reported once per track;
    /// `show_message` is false inside the error cooldown.
    TrackFailed {
        track: TrackId,
        error: PlaybackError,
        show_message: bool,
    },
}

/// Owns the playback engines and keeps them in step.
pub struct PlaybackSynchronizer {
    primary: Box<dyn PlaybackEngine>,
    secondary: Box<dyn PlaybackEngine>,
    mirror: Option<Box<dyn PlaybackEngine>>,
    resolver: AssetResolver,
    settings: PlaybackSettings,
    state: SyncState,
    current: Option<Track>,
    loaded: Option<AssetPair>,
    scrubbing: bool,
    idle_clip: Option<PathBuf>,
    /// Track whose failure was already reported.
    failed_track: Option<TrackId>,
    last_error_shown: Option<Instant>,
}

impl PlaybackSynchronizer {
    pub fn new(
        primary: Box<dyn PlaybackEngine>,
        secondary: Box<dyn PlaybackEngine>,
        resolver: AssetResolver,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            primary,
            secondary,
            mirror: None,
            resolver,
            settings,
            state: SyncState::Stopped,
            current: None,
            loaded: None,
            scrubbing: false,
            idle_clip: None,
            failed_track: None,
            last_error_shown: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn loaded_assets(&self) -> Option<&AssetPair> {
        self.loaded.as_ref()
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    pub fn engine(&self, role: EngineRole) -> Option<&dyn PlaybackEngine> {
        match role {
            EngineRole::Primary => Some(self.primary.as_ref()),
            EngineRole::Secondary => Some(self.secondary.as_ref()),
            EngineRole::Mirror => self.mirror.as_deref(),
        }
    }

    /// Load `track` without starting it.
    pub fn load(&mut self, track: &Track) {
        self.stop_engines();
        self.primary.set_looping(false);
        self.secondary.set_looping(false);

        let pair = AssetPair::for_track(track, &self.resolver);
        tracing::info!(
            "Loading {} (key {}, tempo {}{})",
            track.file_name(),
            track.controls().key_label(),
            track.controls().tempo_label(),
            if pair.shifted { ", rendered" } else { "" }
        );

        self.primary.set_source(Some(&pair.primary));
        self.secondary.set_source(Some(&pair.secondary));
        self.primary.set_position_ms(0);
        self.secondary.set_position_ms(0);
        self.primary.set_rate(pair.primary_rate);
        self.secondary.set_rate(pair.secondary_rate);

        if self.failed_track != Some(track.id()) {
            self.failed_track = None;
        }
        self.current = Some(track.clone());
        self.loaded = Some(pair);
        self.state = SyncState::Stopped;
        self.update_mirror_source();
    }

    pub fn play(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.primary.play();
        self.secondary.play();
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.play();
        }
        self.state = SyncState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state != SyncState::Playing {
            return;
        }
        self.primary.pause();
        self.secondary.pause();
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.pause();
        }
        self.state = SyncState::Paused;
    }

    /// Toggle between playing and paused. Returns the new state.
    pub fn play_pause(&mut self) -> SyncState {
        match self.state {
            SyncState::Playing => self.pause(),
            SyncState::Paused | SyncState::Stopped => self.play(),
            SyncState::Idle => {}
        }
        self.state
    }

    /// Seek by `delta_ms` while playing, clamped at the start.
    pub fn seek_relative(&mut self, delta_ms: i64) {
        if self.state != SyncState::Playing {
            return;
        }
        let target = (self.primary.position_ms() as i64).saturating_add(delta_ms).max(0) as u64;
        self.set_position(target);
    }

    /// Suspend drift correction while the user drags the position slider.
    pub fn begin_scrub(&mut self) {
        self.scrubbing = true;
    }

    /// Seek to `fraction` of the track and resume drift correction.
    ///
    /// Sidecar tracks use the track's known duration since the graphics
    /// stream reports none of its own.
    pub fn end_scrub(&mut self, fraction: f64) {
        self.scrubbing = false;
        let Some(track) = &self.current else {
            return;
        };
        let duration = if track.is_sidecar() {
            match track.duration_ms() {
                0 => self.secondary.duration_ms(),
                ms => ms,
            }
        } else {
            self.primary.duration_ms()
        };
        let target = (fraction.clamp(0.0, 1.0) * duration as f64) as u64;
        self.set_position(target);
    }

    fn set_position(&mut self, position_ms: u64) {
        self.primary.set_position_ms(position_ms);
        self.secondary.set_position_ms(position_ms);
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.set_position_ms(position_ms);
        }
    }

    /// Reload `track` after its controls changed.
    ///
    /// Video tracks keep their position; sidecar tracks restart. The
    /// playing/paused state is kept.
    pub fn reload_keeping_position(&mut self, track: &Track) {
        let was_playing = self.state == SyncState::Playing;
        let position = if track.is_sidecar() {
            0
        } else {
            self.primary.position_ms()
        };

        self.load(track);
        self.set_position(position);
        if was_playing {
            self.play();
        } else {
            self.primary.pause();
            self.secondary.pause();
            self.state = SyncState::Paused;
        }
    }

    /// Playhead and duration of the loaded track in milliseconds.
    ///
    /// Sidecar tracks report the audio engine's clock.
    pub fn progress(&self) -> Option<(u64, u64)> {
        let track = self.current.as_ref()?;
        if track.is_sidecar() {
            let duration = match self.secondary.duration_ms() {
                0 => track.duration_ms(),
                ms => ms,
            };
            Some((self.secondary.position_ms(), duration))
        } else {
            Some((self.primary.position_ms(), self.primary.duration_ms()))
        }
    }

    /// Whether a sidecar track has played past its outro marker.
    ///
    /// Markers are measured on the original audio; a time-stretched render
    /// moves the outro by the tempo factor.
    pub fn reached_outro(&self) -> bool {
        if self.state != SyncState::Playing {
            return false;
        }
        let Some(track) = self.current.as_ref().filter(|t| t.is_sidecar()) else {
            return false;
        };
        let Some(markers) = track.markers().filter(|m| m.outro_ms > 0) else {
            return false;
        };
        let outro = match &self.loaded {
            Some(pair) if pair.shifted => {
                effective_duration_ms(markers.outro_ms, track.controls().tempo_factor())
            }
            _ => markers.outro_ms,
        };
        self.secondary.position_ms() >= outro
    }

    /// Attach silence markers to the loaded track if it is `track`.
    pub fn set_markers(&mut self, track: TrackId, markers: SilenceMarkers) {
        if let Some(current) = self.current.as_mut().filter(|t| t.id() == track) {
            current.set_markers(markers);
        }
    }

    /// One drift-correction pass.
    pub fn correct_drift(&mut self) -> Vec<Correction> {
        let mut corrections = Vec::new();
        if self.scrubbing {
            return corrections;
        }
        let tolerance = self.settings.drift_tolerance_ms;

        if self.primary.state() == EngineState::Playing {
            if let Some(track) = &self.current {
                if !track.is_sidecar() {
                    let primary = self.primary.position_ms();
                    let drift = primary.abs_diff(self.secondary.position_ms());
                    if drift > tolerance {
                        tracing::debug!("Audio drifted {} ms, resyncing", drift);
                        self.secondary.set_position_ms(primary);
                        corrections.push(Correction::SnappedSecondary { drift_ms: drift });
                    }
                } else if track.controls().tempo_steps == 0 {
                    // Rate only matters without a tempo change
                    let rate = self.primary.rate();
                    if (rate - 1.0).abs() > RATE_EPSILON {
                        self.primary.set_rate(1.0);
                        corrections.push(Correction::ResetPrimaryRate { from: rate });
                    }
                }
            }
        }

        if let Some(mirror) = self.mirror.as_mut() {
            if mirror.state() == EngineState::Playing {
                let primary = self.primary.position_ms();
                let drift = mirror.position_ms().abs_diff(primary);
                if drift > tolerance {
                    mirror.set_position_ms(primary);
                    corrections.push(Correction::SnappedMirror { drift_ms: drift });
                }
            }
        }
        corrections
    }

    /// Drain engine events.
    pub fn poll_events(&mut self) -> Vec<SyncNotice> {
        let mut events = Vec::new();
        while let Some(event) = self.primary.poll_event() {
            events.push((EngineRole::Primary, event));
        }
        while let Some(event) = self.secondary.poll_event() {
            events.push((EngineRole::Secondary, event));
        }
        if let Some(mirror) = self.mirror.as_mut() {
            while let Some(event) = mirror.poll_event() {
                if let EngineEvent::Error(message) = event {
                    tracing::warn!("Mirror playback error: {}", message);
                }
            }
        }

        let mut notices = Vec::new();
        for (role, event) in events {
            if self.state == SyncState::Idle {
                if let EngineEvent::Error(message) = event {
                    tracing::warn!("Idle clip failed on {} engine: {}", role, message);
                }
                continue;
            }
            let Some(track) = self.current.as_ref().map(Track::id) else {
                continue;
            };

            match event {
                EngineEvent::EndOfMedia if role == EngineRole::Primary => {
                    notices.push(SyncNotice::TrackEnded(track));
                }
                EngineEvent::EndOfMedia => {}
                EngineEvent::Error(message) => {
                    if self.failed_track == Some(track) {
                        tracing::debug!("Suppressing repeated error for {}: {}", track, message);
                        continue;
                    }
                    self.failed_track = Some(track);

                    let now = Instant::now();
                    let show_message = self
                        .last_error_shown
                        .map_or(true, |at| now.duration_since(at) >= self.settings.error_cooldown());
                    if show_message {
                        self.last_error_shown = Some(now);
                    }
                    let error = PlaybackError::new(role, message);
                    tracing::error!("{}", error);
                    notices.push(SyncNotice::TrackFailed {
                        track,
                        error,
                        show_message,
                    });
                }
            }
        }
        notices
    }

    /// Clip looped while the queue is empty.
    pub fn set_idle_clip(&mut self, clip: Option<PathBuf>) {
        self.idle_clip = clip;
        if self.state == SyncState::Idle {
            self.start_idle();
        }
    }

    pub fn idle_clip(&self) -> Option<&Path> {
        self.idle_clip.as_deref()
    }

    fn start_idle(&mut self) {
        self.stop_engines();
        self.secondary.set_source(None);
        match self.idle_clip.clone() {
            Some(clip) => {
                self.primary.set_source(Some(&clip));
                self.primary.set_rate(1.0);
                self.primary.set_looping(true);
                self.primary.play();
            }
            None => self.primary.set_source(None),
        }
        self.update_mirror_source();
    }

    /// Attach a second-screen engine.
    pub fn open_mirror(&mut self, engine: Box<dyn PlaybackEngine>) {
        self.mirror = Some(engine);
        self.update_mirror_source();
    }

    /// Detach the second-screen engine.
    pub fn close_mirror(&mut self) -> Option<Box<dyn PlaybackEngine>> {
        let mut mirror = self.mirror.take()?;
        mirror.stop();
        Some(mirror)
    }

    /// Point the mirror at what the primary shows.
    ///
    /// Combined key/tempo tracks whose render is not loaded yet keep the
    /// mirror's current source.
    pub fn update_mirror_source(&mut self) {
        let Some(mirror) = self.mirror.as_mut() else {
            return;
        };

        if self.state == SyncState::Idle || self.current.is_none() {
            match &self.idle_clip {
                Some(clip) if self.state == SyncState::Idle => {
                    mirror.set_source(Some(clip));
                    mirror.set_looping(true);
                    mirror.set_position_ms(self.primary.position_ms());
                    mirror.play();
                }
                _ => mirror.stop(),
            }
            return;
        }

        let (Some(track), Some(pair)) = (&self.current, &self.loaded) else {
            return;
        };
        if track.controls().kind() == Some(ShiftKind::Combined) && !pair.shifted {
            tracing::debug!("Combined render for {} not ready, mirror unchanged", track.file_name());
            return;
        }

        mirror.set_source(Some(&pair.primary));
        mirror.set_looping(false);
        mirror.set_rate(pair.primary_rate);
        mirror.set_position_ms(self.primary.position_ms());
        match self.primary.state() {
            EngineState::Playing => mirror.play(),
            EngineState::Paused => mirror.pause(),
            EngineState::Stopped => {}
        }
    }

    fn stop_engines(&mut self) {
        self.primary.stop();
        self.secondary.stop();
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.stop();
        }
    }
}

impl PlaybackControl for PlaybackSynchronizer {
    fn load_and_play(&mut self, track: &Track) {
        self.load(track);
        self.play();
    }

    fn stop(&mut self) {
        self.stop_engines();
        self.state = SyncState::Stopped;
    }

    fn enter_idle(&mut self) {
        tracing::info!("Queue empty, returning to idle");
        self.current = None;
        self.loaded = None;
        self.failed_track = None;
        self.state = SyncState::Idle;
        self.start_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ShiftControls, ShiftedAsset};
    use crate::testing::ScriptedEngine;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Rig {
        dir: TempDir,
        sync: PlaybackSynchronizer,
        primary: ScriptedEngine,
        secondary: ScriptedEngine,
    }

    fn rig() -> Rig {
        let dir = tempdir().unwrap();
        let primary = ScriptedEngine::new();
        let secondary = ScriptedEngine::new();
        let sync = PlaybackSynchronizer::new(
            Box::new(primary.clone()),
            Box::new(secondary.clone()),
            AssetResolver::new(dir.path().join("temp"), "flac"),
            PlaybackSettings::default(),
        );
        Rig {
            dir,
            sync,
            primary,
            secondary,
        }
    }

    fn file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn video_drift_beyond_tolerance_snaps_audio() {
        let mut r = rig();
        let track = Track::from_path(file(r.dir.path(), "v.mp4")).unwrap();
        r.sync.load_and_play(&track);

        r.primary.set_position(10_000);
        r.secondary.set_position(10_200);
        assert!(r.sync.correct_drift().is_empty());

        r.secondary.set_position(10_400);
        assert_eq!(
            r.sync.correct_drift(),
            vec![Correction::SnappedSecondary { drift_ms: 400 }]
        );
        assert_eq!(r.secondary.position(), 10_000);
    }

    #[test]
    fn load_sets_sources_without_an_intermediate_state() {
        let mut r = rig();
        assert_eq!(r.sync.state(), SyncState::Stopped);
        let video = file(r.dir.path(), "v.mp4");
        let track = Track::from_path(&video).unwrap();

        r.sync.load(&track);
        assert_eq!(r.sync.state(), SyncState::Stopped);
        assert_eq!(r.primary.source(), Some(video.clone()));
        assert_eq!(r.secondary.source(), Some(video));
        assert_eq!(r.sync.current_track().map(|t| t.id()), Some(track.id()));

        r.sync.play();
        assert_eq!(r.sync.state(), SyncState::Playing);
        assert_eq!(r.primary.state(), EngineState::Playing);
    }

    #[test]
    fn no_correction_while_scrubbing_or_paused() {
        let mut r = rig();
        let track = Track::from_path(file(r.dir.path(), "v.mp4")).unwrap();
        r.sync.load_and_play(&track);
        r.secondary.set_position(5_000);

        r.sync.begin_scrub();
        assert!(r.sync.correct_drift().is_empty());
        assert_eq!(r.secondary.position(), 5_000);

        r.sync.end_scrub(0.5);
        assert!(!r.sync.is_scrubbing());

        r.sync.pause();
        r.secondary.set_position(9_000);
        assert!(r.sync.correct_drift().is_empty());
    }

    #[test]
    fn original_asset_plays_at_tempo_rate() {
        let mut r = rig();
        let track = Track::from_path(file(r.dir.path(), "v.mp4"))
            .unwrap()
            .with_controls(ShiftControls::new(0, 2));
        r.sync.load(&track);

        let pair = r.sync.loaded_assets().unwrap();
        assert!(!pair.shifted);
        assert!((r.primary.rate() - 1.1).abs() < 1e-9);
        assert!((r.secondary.rate() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn rendered_video_asset_resets_rate() {
        let mut r = rig();
        let rendered = file(r.dir.path(), "temp/v_Tempo10.mp4");
        let mut track = Track::from_path(file(r.dir.path(), "v.mp4"))
            .unwrap()
            .with_controls(ShiftControls::new(0, 2));
        track.set_shifted(ShiftedAsset::TempoOnly(rendered.clone()));
        r.sync.load(&track);

        assert_eq!(r.primary.source(), Some(rendered.clone()));
        assert_eq!(r.secondary.source(), Some(rendered));
        assert_eq!(r.primary.rate(), 1.0);
        assert_eq!(r.secondary.rate(), 1.0);
    }

    #[test]
    fn sidecar_with_render_rates_graphics() {
        let mut r = rig();
        let cdg = file(r.dir.path(), "s.cdg");
        file(r.dir.path(), "s.mp3");
        let rendered = file(r.dir.path(), "temp/s_Key1_Tempo-10.flac");
        let track = Track::from_path(&cdg)
            .unwrap()
            .with_controls(ShiftControls::new(1, -2));
        r.sync.load_and_play(&track);

        assert_eq!(r.primary.source(), Some(cdg));
        assert_eq!(r.secondary.source(), Some(rendered));
        assert!((r.primary.rate() - 0.9).abs() < 1e-9);
        assert_eq!(r.secondary.rate(), 1.0);

        // Tempo change in effect: the graphics rate is left alone and
        // positions are never snapped
        r.secondary.set_position(50_000);
        assert!(r.sync.correct_drift().is_empty());
    }

    #[test]
    fn sidecar_without_tempo_enforces_normal_rate() {
        let mut r = rig();
        let cdg = file(r.dir.path(), "s.cdg");
        file(r.dir.path(), "s.mp3");
        let track = Track::from_path(&cdg)
            .unwrap()
            .with_controls(ShiftControls::new(2, 0));
        r.sync.load_and_play(&track);

        r.primary.set_rate_directly(1.3);
        assert_eq!(
            r.sync.correct_drift(),
            vec![Correction::ResetPrimaryRate { from: 1.3 }]
        );
        assert_eq!(r.primary.rate(), 1.0);
    }

    #[test]
    fn errors_are_reported_once_per_track() {
        let mut r = rig();
        let a = Track::from_path(file(r.dir.path(), "a.mp4")).unwrap();
        r.sync.load_and_play(&a);

        r.primary.push_event(EngineEvent::Error("decode".into()));
        r.secondary.push_event(EngineEvent::Error("decode".into()));
        let notices = r.sync.poll_events();
        assert_eq!(notices.len(), 1);
        assert!(matches!(
            &notices[0],
            SyncNotice::TrackFailed { show_message: true, error, .. } if error.engine == EngineRole::Primary
        ));

        // Another track failing inside the cooldown is reported silently
        let b = Track::from_path(file(r.dir.path(), "b.mp4")).unwrap();
        r.sync.load_and_play(&b);
        r.primary.push_event(EngineEvent::Error("decode".into()));
        let notices = r.sync.poll_events();
        assert!(matches!(
            &notices[..],
            [SyncNotice::TrackFailed { show_message: false, .. }]
        ));
    }

    #[test]
    fn end_of_media_names_the_track() {
        let mut r = rig();
        let a = Track::from_path(file(r.dir.path(), "a.mp4")).unwrap();
        r.sync.load_and_play(&a);
        r.secondary.push_event(EngineEvent::EndOfMedia);
        assert!(r.sync.poll_events().is_empty());
        r.primary.push_event(EngineEvent::EndOfMedia);
        assert_eq!(r.sync.poll_events(), vec![SyncNotice::TrackEnded(a.id())]);
    }

    #[test]
    fn seek_and_scrub() {
        let mut r = rig();
        let a = Track::from_path(file(r.dir.path(), "a.mp4")).unwrap();
        r.sync.load_and_play(&a);
        r.primary.set_duration(200_000);

        r.primary.set_position(3_000);
        r.sync.seek_relative(-5_000);
        assert_eq!(r.primary.position(), 0);
        assert_eq!(r.secondary.position(), 0);

        r.sync.seek_relative(5_000);
        assert_eq!(r.primary.position(), 5_000);

        r.sync.begin_scrub();
        r.sync.end_scrub(0.25);
        assert_eq!(r.primary.position(), 50_000);
        assert_eq!(r.secondary.position(), 50_000);

        r.sync.pause();
        r.sync.seek_relative(5_000);
        assert_eq!(r.primary.position(), 50_000, "seek only while playing");
    }

    #[test]
    fn sidecar_scrub_uses_track_duration() {
        let mut r = rig();
        let cdg = file(r.dir.path(), "s.cdg");
        file(r.dir.path(), "s.mp3");
        let track = Track::from_path(&cdg).unwrap().with_duration_ms(100_000);
        r.sync.load_and_play(&track);

        r.sync.end_scrub(0.5);
        assert_eq!(r.secondary.position(), 50_000);
        r.secondary.set_position(42_000);
        assert_eq!(r.sync.progress(), Some((42_000, 100_000)));
    }

    #[test]
    fn reload_keeps_video_position_and_restarts_sidecar() {
        let mut r = rig();
        let mut video = Track::from_path(file(r.dir.path(), "v.mp4")).unwrap();
        r.sync.load_and_play(&video);
        r.primary.set_position(30_000);
        video.shift_key(1);
        r.sync.reload_keeping_position(&video);
        assert_eq!(r.primary.position(), 30_000);
        assert_eq!(r.sync.state(), SyncState::Playing);

        let cdg = file(r.dir.path(), "s.cdg");
        let mut sidecar = Track::from_path(&cdg).unwrap();
        r.sync.load_and_play(&sidecar);
        r.sync.pause();
        r.primary.set_position(30_000);
        sidecar.shift_key(1);
        r.sync.reload_keeping_position(&sidecar);
        assert_eq!(r.primary.position(), 0);
        assert_eq!(r.sync.state(), SyncState::Paused);
    }

    #[test]
    fn outro_marker_only_counts_for_sidecar() {
        let mut r = rig();
        let cdg = file(r.dir.path(), "s.cdg");
        let mut track = Track::from_path(&cdg).unwrap();
        track.set_markers(SilenceMarkers {
            intro_ms: 1_000,
            outro_ms: 90_000,
        });
        r.sync.load_and_play(&track);
        r.secondary.set_position(89_000);
        assert!(!r.sync.reached_outro());
        r.secondary.set_position(90_000);
        assert!(r.sync.reached_outro());

        let mut video = Track::from_path(file(r.dir.path(), "v.mp4")).unwrap();
        video.set_markers(SilenceMarkers {
            intro_ms: 0,
            outro_ms: 10,
        });
        r.sync.load_and_play(&video);
        r.secondary.set_position(50_000);
        assert!(!r.sync.reached_outro());
    }

    #[test]
    fn outro_scales_with_stretched_render() {
        let mut r = rig();
        let cdg = file(r.dir.path(), "s.cdg");
        let rendered = file(r.dir.path(), "temp/s_Tempo-20.flac");
        let mut track = Track::from_path(&cdg)
            .unwrap()
            .with_controls(ShiftControls::new(0, -4));
        track.set_shifted(ShiftedAsset::TempoOnly(rendered));
        track.set_markers(SilenceMarkers {
            intro_ms: 0,
            outro_ms: 80_000,
        });
        r.sync.load_and_play(&track);

        // 80 s of audio at 0.8x lasts 100 s
        r.secondary.set_position(90_000);
        assert!(!r.sync.reached_outro());
        r.secondary.set_position(100_000);
        assert!(r.sync.reached_outro());
    }

    #[test]
    fn idle_loops_clip_on_primary_and_mirror() {
        let mut r = rig();
        let clip = file(r.dir.path(), "Idles/wire.mp4");
        let mirror = ScriptedEngine::new();
        r.sync.open_mirror(Box::new(mirror.clone()));
        r.sync.set_idle_clip(Some(clip.clone()));

        r.sync.enter_idle();
        assert_eq!(r.sync.state(), SyncState::Idle);
        assert_eq!(r.primary.source(), Some(clip.clone()));
        assert!(r.primary.looping());
        assert_eq!(r.primary.state(), EngineState::Playing);
        assert_eq!(r.secondary.source(), None);
        assert_eq!(mirror.source(), Some(clip));
        assert!(mirror.looping());

        // Idle clip errors never become track failures
        r.primary.push_event(EngineEvent::Error("bad clip".into()));
        assert!(r.sync.poll_events().is_empty());
    }

    #[test]
    fn mirror_follows_primary_and_is_corrected() {
        let mut r = rig();
        let a = Track::from_path(file(r.dir.path(), "a.mp4")).unwrap();
        r.sync.load_and_play(&a);

        let mirror = ScriptedEngine::new();
        r.sync.open_mirror(Box::new(mirror.clone()));
        assert_eq!(mirror.source(), r.primary.source());
        assert_eq!(mirror.state(), EngineState::Playing);

        r.primary.set_position(20_000);
        r.secondary.set_position(20_000);
        mirror.set_position(19_000);
        assert_eq!(
            r.sync.correct_drift(),
            vec![Correction::SnappedMirror { drift_ms: 1_000 }]
        );
        assert_eq!(mirror.position(), 20_000);

        assert!(r.sync.close_mirror().is_some());
        assert_eq!(mirror.state(), EngineState::Stopped);
    }

    #[test]
    fn mirror_skips_missing_combined_render() {
        let mut r = rig();
        let mirror = ScriptedEngine::new();
        r.sync.open_mirror(Box::new(mirror.clone()));

        let plain = Track::from_path(file(r.dir.path(), "a.mp4")).unwrap();
        r.sync.load_and_play(&plain);
        let shown = mirror.source();

        let combined = Track::from_path(file(r.dir.path(), "b.mp4"))
            .unwrap()
            .with_controls(ShiftControls::new(1, 1));
        r.sync.load_and_play(&combined);
        assert_eq!(mirror.source(), shown);
    }
}
