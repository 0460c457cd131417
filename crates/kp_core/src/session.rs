//! Interactive playback session.
//!
//! Ties the play queue, the render coordinator, the playback synchronizer,
//! the idle rotation and the silence scanner together. Everything here runs
//! on one thread; renders and silence scans report back over channels and
//! are applied on the next tick.
//!
//! [`KaraokeSession::run`] drives the session from a command channel with
//! three timers:
//! - sync: drift correction
//! - UI refresh: engine events, worker results, outro detection, status
//! - idle: rotate the ambient clip while the queue is empty

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{never, select, tick, Receiver};

use crate::config::{PlaybackSettings, Settings};
use crate::history::HistoryLog;
use crate::logging::LogConfig;
use crate::media::{AssetResolver, CodecSettings, MediaToolkit};
use crate::models::{format_mmss, ShiftControls, SilenceMarkers, Track, TrackId};
use crate::playback::{
    Correction, IdleRotation, PlaybackEngine, PlaybackError, PlaybackSynchronizer, SyncNotice,
    SyncState,
};
use crate::queue::{AddOutcome, PlaybackControl, QueueError, QueueManager, QueueResult};
use crate::render::{RenderCoordinator, RenderEvent, RenderIntent, RenderRequest, ShiftRenderWorker};
use crate::silence::{SilenceError, SilenceMessage, SilenceScanner};

/// A request from the front-end.
pub enum SessionCommand {
    Add { track: Track, autoplay: bool },
    PlayNow(TrackId),
    PlayNext,
    PlayPause,
    Remove(Vec<TrackId>),
    ShuffleUpcoming,
    MoveTrack { from: usize, to: usize },
    MoveUp(Vec<usize>),
    MoveDown(Vec<usize>),
    SetControls { track: TrackId, controls: ShiftControls },
    /// Render a queued track with its current controls and move it to the
    /// end of the queue.
    Render(TrackId),
    CancelRender,
    SeekForward,
    SeekBackward,
    BeginScrub,
    EndScrub(f64),
    OpenMirror(Box<dyn PlaybackEngine>),
    CloseMirror,
    Shutdown,
}

/// Snapshot for the status bar.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SyncState,
    pub now_playing: Option<String>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub queue_summary: String,
    pub render_status: Option<String>,
}

impl SessionStatus {
    /// `m:ss / m:ss` progress label.
    pub fn time_label(&self) -> String {
        format!("{} / {}", format_mmss(self.position_ms), format_mmss(self.duration_ms))
    }
}

/// Something the front-end should show.
#[derive(Debug)]
pub enum SessionEvent {
    Render(RenderEvent),
    TrackFailed {
        track: TrackId,
        error: PlaybackError,
        show_message: bool,
    },
    MarkersFound {
        track: TrackId,
        markers: SilenceMarkers,
    },
    Rejected(QueueError),
    Status(SessionStatus),
}

pub struct KaraokeSession {
    queue: QueueManager,
    renders: RenderCoordinator,
    player: PlaybackSynchronizer,
    idle: IdleRotation,
    silence: SilenceScanner,
    playback: PlaybackSettings,
    idle_interval: Option<std::time::Duration>,
    /// Track a silence scan was last started for.
    scanning: Option<TrackId>,
}

impl KaraokeSession {
    /// Build a session from settings and start in the idle loop.
    pub fn new(
        settings: &Settings,
        toolkit: Arc<dyn MediaToolkit>,
        primary: Box<dyn PlaybackEngine>,
        secondary: Box<dyn PlaybackEngine>,
    ) -> Self {
        let paths = &settings.paths;
        let resolver = AssetResolver::new(&paths.temp_folder, settings.render.lossless_extension.as_str());

        let mut worker = ShiftRenderWorker::new(
            Arc::clone(&toolkit),
            resolver.clone(),
            CodecSettings::from(&settings.render),
        );
        if settings.logging.render_logs {
            worker = worker.with_logs(&paths.logs_folder, LogConfig::from(&settings.logging));
        }

        let queue = QueueManager::new(HistoryLog::new(&paths.history_file), resolver.clone());
        let mut player = PlaybackSynchronizer::new(primary, secondary, resolver, settings.playback.clone());
        let idle = IdleRotation::scan(&PathBuf::from(&paths.idles_folder), &settings.idle.default_idle);
        player.set_idle_clip(idle.current().map(PathBuf::from));
        player.enter_idle();

        Self {
            queue,
            renders: RenderCoordinator::new(worker),
            player,
            idle,
            silence: SilenceScanner::new(toolkit),
            playback: settings.playback.clone(),
            idle_interval: settings.idle.change_interval(),
            scanning: None,
        }
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn renders(&self) -> &RenderCoordinator {
        &self.renders
    }

    pub fn player(&self) -> &PlaybackSynchronizer {
        &self.player
    }

    pub fn idle(&self) -> &IdleRotation {
        &self.idle
    }

    /// Queue a track; with `autoplay` the queue starts if nothing is loaded.
    pub fn add(&mut self, track: Track, autoplay: bool) -> AddOutcome {
        let outcome = self.queue.add(track, &mut self.renders);
        if autoplay && matches!(outcome, AddOutcome::Queued { .. }) {
            self.queue.start_if_idle(&mut self.player);
            self.scan_current();
        }
        outcome
    }

    pub fn play_now(&mut self, id: TrackId) -> QueueResult<()> {
        self.queue.play_now(id, &mut self.player)?;
        self.scan_current();
        Ok(())
    }

    pub fn play_next(&mut self) -> Option<TrackId> {
        let next = self.queue.play_next(&mut self.player);
        self.scan_current();
        next
    }

    /// Toggle playback, starting the queue from the head when nothing is
    /// loaded.
    pub fn play_pause(&mut self) -> SyncState {
        if self.queue.cursor().is_none() {
            if self.queue.start_if_idle(&mut self.player) {
                self.scan_current();
            }
            return self.player.state();
        }
        self.player.play_pause()
    }

    pub fn remove(&mut self, ids: &[TrackId]) -> usize {
        self.queue.remove(ids, &mut self.player)
    }

    pub fn shuffle_upcoming(&mut self) {
        self.queue.shuffle_upcoming(&mut rand::rng());
    }

    /// Change a queued track's key/tempo.
    ///
    /// For the loaded track, a cached or unshifted result is reloaded in
    /// place; otherwise it is rendered and swapped in when ready while the
    /// old asset keeps playing. Other tracks only take the new controls.
    pub fn set_controls(&mut self, id: TrackId, controls: ShiftControls) -> QueueResult<()> {
        let track = self.queue.get(id).ok_or(QueueError::TrackNotFound(id))?;
        if track.is_rendering() {
            return Err(QueueError::TrackRendering(track.file_name()));
        }
        let is_current = self.queue.current().map(Track::id) == Some(id);

        let updated = self
            .queue
            .set_controls(id, controls)
            .cloned()
            .ok_or(QueueError::TrackNotFound(id))?;
        if !is_current {
            return Ok(());
        }

        if updated.controls().is_default() || !updated.shifted().is_none() {
            self.player.reload_keeping_position(&updated);
        } else if let Some(request) = RenderRequest::new(updated, RenderIntent::PromoteAndPlay) {
            self.renders.enqueue(request, &mut self.queue);
        }
        Ok(())
    }

    /// Render a queued track with its current controls.
    ///
    /// Returns false when the track has no key/tempo change.
    pub fn render(&mut self, id: TrackId) -> QueueResult<bool> {
        let track = self.queue.get(id).ok_or(QueueError::TrackNotFound(id))?;
        if track.is_rendering() {
            return Err(QueueError::TrackRendering(track.file_name()));
        }
        match RenderRequest::new(track.clone(), RenderIntent::AppendToQueue) {
            Some(request) => {
                self.renders.enqueue(request, &mut self.queue);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn cancel_render(&mut self) -> bool {
        self.renders.cancel_active()
    }

    pub fn seek_forward(&mut self) {
        self.player.seek_relative(self.playback.seek_step_ms as i64);
    }

    pub fn seek_backward(&mut self) {
        self.player.seek_relative(-(self.playback.seek_step_ms as i64));
    }

    pub fn begin_scrub(&mut self) {
        self.player.begin_scrub();
    }

    pub fn end_scrub(&mut self, fraction: f64) {
        self.player.end_scrub(fraction);
    }

    pub fn open_mirror(&mut self, engine: Box<dyn PlaybackEngine>) {
        self.player.open_mirror(engine);
    }

    pub fn close_mirror(&mut self) -> Option<Box<dyn PlaybackEngine>> {
        self.player.close_mirror()
    }

    /// Apply one front-end command.
    pub fn apply(&mut self, command: SessionCommand) -> Vec<SessionEvent> {
        let result = match command {
            SessionCommand::Add { track, autoplay } => {
                self.add(track, autoplay);
                Ok(())
            }
            SessionCommand::PlayNow(id) => self.play_now(id),
            SessionCommand::PlayNext => {
                self.play_next();
                Ok(())
            }
            SessionCommand::PlayPause => {
                self.play_pause();
                Ok(())
            }
            SessionCommand::Remove(ids) => {
                self.remove(&ids);
                Ok(())
            }
            SessionCommand::ShuffleUpcoming => {
                self.shuffle_upcoming();
                Ok(())
            }
            SessionCommand::MoveTrack { from, to } => {
                self.queue.move_track(from, to);
                Ok(())
            }
            SessionCommand::MoveUp(indices) => {
                self.queue.move_up(&indices);
                Ok(())
            }
            SessionCommand::MoveDown(indices) => {
                self.queue.move_down(&indices);
                Ok(())
            }
            SessionCommand::SetControls { track, controls } => self.set_controls(track, controls),
            SessionCommand::Render(id) => self.render(id).map(|_| ()),
            SessionCommand::CancelRender => {
                self.cancel_render();
                Ok(())
            }
            SessionCommand::SeekForward => {
                self.seek_forward();
                Ok(())
            }
            SessionCommand::SeekBackward => {
                self.seek_backward();
                Ok(())
            }
            SessionCommand::BeginScrub => {
                self.begin_scrub();
                Ok(())
            }
            SessionCommand::EndScrub(fraction) => {
                self.end_scrub(fraction);
                Ok(())
            }
            SessionCommand::OpenMirror(engine) => {
                self.open_mirror(engine);
                Ok(())
            }
            SessionCommand::CloseMirror => {
                self.close_mirror();
                Ok(())
            }
            SessionCommand::Shutdown => {
                self.shutdown();
                Ok(())
            }
        };

        match result {
            Ok(()) => Vec::new(),
            Err(e) => {
                tracing::warn!("{}", e);
                vec![SessionEvent::Rejected(e)]
            }
        }
    }

    /// Drift correction pass.
    pub fn sync_tick(&mut self) -> Vec<Correction> {
        self.player.correct_drift()
    }

    /// Apply worker results and engine events, advance past finished
    /// tracks, and report status.
    pub fn ui_tick(&mut self) -> Vec<SessionEvent> {
        let mut events: Vec<SessionEvent> = self
            .renders
            .poll(&mut self.queue, &mut self.player)
            .into_iter()
            .map(SessionEvent::Render)
            .collect();

        for message in self.silence.drain() {
            events.extend(self.apply_markers(message));
        }

        for notice in self.player.poll_events() {
            match notice {
                SyncNotice::TrackEnded(track) => {
                    tracing::info!("Track {} finished", track);
                    self.advance_from(track);
                }
                SyncNotice::TrackFailed {
                    track,
                    error,
                    show_message,
                } => {
                    events.push(SessionEvent::TrackFailed {
                        track,
                        error,
                        show_message,
                    });
                    self.advance_from(track);
                }
            }
        }

        if self.player.reached_outro() {
            if let Some(track) = self.player.current_track().map(Track::id) {
                tracing::info!("Outro reached for {}", track);
                self.advance_from(track);
            }
        }

        self.scan_current();
        events.push(SessionEvent::Status(self.status()));
        events
    }

    /// Switch to another idle clip while the queue is empty.
    pub fn idle_tick(&mut self) {
        if self.player.state() != SyncState::Idle {
            return;
        }
        if let Some(clip) = self.idle.next_random(&mut rand::rng()) {
            tracing::debug!("Idle clip: {}", clip.display());
            self.player.set_idle_clip(Some(clip.to_path_buf()));
        }
    }

    pub fn status(&self) -> SessionStatus {
        let (position_ms, duration_ms) = self.player.progress().unwrap_or((0, 0));
        SessionStatus {
            state: self.player.state(),
            now_playing: self.player.current_track().map(Track::file_name),
            position_ms,
            duration_ms,
            queue_summary: self.queue.summary(position_ms),
            render_status: self.renders.status_line(),
        }
    }

    /// Run until a `Shutdown` command arrives or the command channel closes.
    pub fn run(&mut self, commands: &Receiver<SessionCommand>, mut on_event: impl FnMut(SessionEvent)) {
        let sync = tick(self.playback.sync_interval());
        let refresh = tick(self.playback.ui_refresh());
        let rotate = match self.idle_interval {
            Some(interval) => tick(interval),
            None => never(),
        };
        tracing::info!("Session loop started");

        loop {
            select! {
                recv(sync) -> _ => {
                    for correction in self.sync_tick() {
                        tracing::trace!("{:?}", correction);
                    }
                }
                recv(refresh) -> _ => {
                    for event in self.ui_tick() {
                        on_event(event);
                    }
                }
                recv(rotate) -> _ => self.idle_tick(),
                recv(commands) -> command => match command {
                    Ok(SessionCommand::Shutdown) | Err(_) => break,
                    Ok(command) => {
                        for event in self.apply(command) {
                            on_event(event);
                        }
                    }
                },
            }
        }

        tracing::info!("Session loop stopping");
        self.shutdown();
    }

    /// Cancel renders, wait for background threads and stop the engines.
    pub fn shutdown(&mut self) {
        self.renders.shutdown();
        self.silence.shutdown();
        PlaybackControl::stop(&mut self.player);
    }

    fn advance_from(&mut self, track: TrackId) {
        if self.queue.current().map(Track::id) == Some(track) {
            self.play_next();
        }
    }

    /// Start a silence scan for a loaded sidecar track without markers.
    fn scan_current(&mut self) {
        let Some(track) = self.player.current_track() else {
            return;
        };
        if !track.is_sidecar() || track.markers().is_some() || self.scanning == Some(track.id()) {
            return;
        }
        let id = track.id();
        let audio = track.audio_source();
        self.scanning = Some(id);
        self.silence.scan(id, &audio);
    }

    fn apply_markers(&mut self, message: SilenceMessage) -> Option<SessionEvent> {
        match message.result {
            Ok(Some(markers)) => {
                tracing::debug!(
                    "{}: audio from {} to {}",
                    message.path.display(),
                    format_mmss(markers.intro_ms),
                    format_mmss(markers.outro_ms)
                );
                self.queue.set_markers(message.track, markers);
                self.player.set_markers(message.track, markers);
                Some(SessionEvent::MarkersFound {
                    track: message.track,
                    markers,
                })
            }
            Ok(None) => {
                tracing::debug!("{} is silent throughout", message.path.display());
                None
            }
            Err(SilenceError::Cancelled) => None,
            Err(e) => {
                tracing::warn!("Silence scan failed: {}", e);
                None
            }
        }
    }
}

impl Drop for KaraokeSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShiftedAsset;
    use crate::playback::{EngineEvent, EngineState};
    use crate::testing::{ScriptedEngine, ScriptedToolkit};
    use crossbeam_channel::unbounded;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        session: KaraokeSession,
        primary: ScriptedEngine,
        secondary: ScriptedEngine,
        toolkit: Arc<ScriptedToolkit>,
    }

    fn path_string(path: PathBuf) -> String {
        path.to_string_lossy().into_owned()
    }

    fn fixture(toolkit: ScriptedToolkit) -> Fixture {
        let dir = tempdir().unwrap();
        let idles = dir.path().join("Idles");
        fs::create_dir_all(&idles).unwrap();
        fs::write(idles.join("wire.mp4"), b"idle").unwrap();
        fs::write(idles.join("rain.mp4"), b"idle").unwrap();

        let mut settings = Settings::default();
        settings.paths.temp_folder = path_string(dir.path().join("temp"));
        settings.paths.history_file = path_string(dir.path().join("history.log"));
        settings.paths.idles_folder = path_string(idles);
        settings.paths.logs_folder = path_string(dir.path().join(".logs"));
        settings.logging.render_logs = false;

        let toolkit = Arc::new(toolkit);
        let primary = ScriptedEngine::new();
        let secondary = ScriptedEngine::new();
        let session = KaraokeSession::new(
            &settings,
            toolkit.clone(),
            Box::new(primary.clone()),
            Box::new(secondary.clone()),
        );
        Fixture {
            dir,
            session,
            primary,
            secondary,
            toolkit,
        }
    }

    fn song(dir: &Path, name: &str) -> Track {
        let path = dir.join(name);
        fs::write(&path, b"media").unwrap();
        Track::from_path(path).unwrap().with_duration_ms(180_000)
    }

    /// Tick the UI until `pred` matches an event.
    fn pump_until(fx: &mut Fixture, pred: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        loop {
            let events = fx.session.ui_tick();
            let found = events.iter().any(&pred);
            seen.extend(events);
            if found {
                return seen;
            }
            assert!(Instant::now() < deadline, "timed out, saw {:?}", seen);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn history_lines(fx: &Fixture) -> Vec<String> {
        fs::read_to_string(fx.dir.path().join("history.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn starts_idle_with_default_clip() {
        let fx = fixture(ScriptedToolkit::succeeding(60_000));
        assert_eq!(fx.session.player().state(), SyncState::Idle);
        let clip = fx.primary.source().unwrap();
        assert_eq!(clip.file_name().unwrap(), "wire.mp4");
        assert!(fx.primary.looping());
    }

    #[test]
    fn plays_through_queue_and_returns_to_idle() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        let a = song(fx.dir.path(), "A - One.mp4");
        let b = song(fx.dir.path(), "B - Two.mp4");
        let (a_id, b_id) = (a.id(), b.id());

        fx.session.add(a, true);
        fx.session.add(b, true);
        assert_eq!(fx.session.queue().current().map(Track::id), Some(a_id));
        assert_eq!(fx.session.player().state(), SyncState::Playing);

        fx.primary.push_event(EngineEvent::EndOfMedia);
        fx.session.ui_tick();
        assert_eq!(fx.session.queue().current().map(Track::id), Some(b_id));

        fx.primary.push_event(EngineEvent::EndOfMedia);
        let events = fx.session.ui_tick();
        assert!(fx.session.queue().is_empty());
        assert_eq!(fx.session.player().state(), SyncState::Idle);

        let history = history_lines(&fx);
        assert_eq!(history.len(), 2);
        assert!(history[0].contains("A - One.mp4"));

        match events.last() {
            Some(SessionEvent::Status(status)) => {
                assert_eq!(status.state, SyncState::Idle);
                assert_eq!(status.queue_summary, "Queue (0 songs - --:--)");
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn play_pause_starts_queue_when_nothing_loaded() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        let a = song(fx.dir.path(), "A - One.mp4");
        fx.session.add(a, false);
        assert_eq!(fx.session.player().state(), SyncState::Idle);

        assert_eq!(fx.session.play_pause(), SyncState::Playing);
        assert_eq!(fx.session.play_pause(), SyncState::Paused);
        assert_eq!(fx.primary.state(), EngineState::Paused);
    }

    #[test]
    fn shifted_add_plays_render_when_queue_idle() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        let track = song(fx.dir.path(), "A - One.mp4").with_controls(ShiftControls::new(2, 0));
        let id = track.id();

        assert_eq!(fx.session.add(track, true), AddOutcome::Rendering { track: id });
        assert_eq!(
            fx.session.status().render_status.as_deref(),
            Some("Rendering: 1 to be added to queue")
        );

        pump_until(&mut fx, |e| matches!(e, SessionEvent::Render(RenderEvent::Completed { .. })));
        let rendered = fx.dir.path().join("temp").join("A - One_Key2.mp4");
        assert_eq!(fx.primary.source(), Some(rendered.clone()));
        assert_eq!(fx.secondary.source(), Some(rendered));
        assert_eq!(fx.session.queue().current().map(Track::id), Some(id));
        assert_eq!(fx.session.status().render_status, None);
    }

    #[test]
    fn changing_current_track_controls_swaps_in_render() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        let a = song(fx.dir.path(), "A - One.mp4");
        let b = song(fx.dir.path(), "B - Two.mp4");
        let a_id = a.id();
        fx.session.add(a, true);
        fx.session.add(b, true);

        fx.session.set_controls(a_id, ShiftControls::new(0, 2)).unwrap();
        assert!(fx.session.queue().get(a_id).unwrap().is_rendering());
        assert!(matches!(
            fx.session.set_controls(a_id, ShiftControls::new(0, 3)),
            Err(QueueError::TrackRendering(_))
        ));

        pump_until(&mut fx, |e| {
            matches!(
                e,
                SessionEvent::Render(RenderEvent::Completed {
                    intent: RenderIntent::PromoteAndPlay,
                    ..
                })
            )
        });
        let current = fx.session.queue().current().unwrap();
        assert_eq!(current.id(), a_id);
        assert!(matches!(current.shifted(), ShiftedAsset::TempoOnly(_)));
        assert_eq!(fx.session.queue().cursor(), Some(0));
        assert_eq!(fx.session.queue().len(), 2);
        assert!(fx.session.player().loaded_assets().unwrap().shifted);
        assert!(history_lines(&fx).is_empty(), "swap is not a play");

        // Back to default reloads in place without rendering
        fx.session.set_controls(a_id, ShiftControls::default()).unwrap();
        assert_eq!(fx.toolkit.transcode_count(), 1);
        assert!(!fx.session.player().loaded_assets().unwrap().shifted);
    }

    #[test]
    fn playback_error_is_reported_and_skipped() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        let a = song(fx.dir.path(), "A - One.mp4");
        let b = song(fx.dir.path(), "B - Two.mp4");
        let (a_id, b_id) = (a.id(), b.id());
        fx.session.add(a, true);
        fx.session.add(b, true);

        fx.primary.push_event(EngineEvent::Error("corrupt".into()));
        fx.secondary.push_event(EngineEvent::Error("corrupt".into()));
        let events = fx.session.ui_tick();

        let failures: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::TrackFailed {
                    track,
                    show_message,
                    ..
                } => Some((*track, *show_message)),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec![(a_id, true)]);
        assert_eq!(fx.session.queue().current().map(Track::id), Some(b_id));
        assert_eq!(fx.session.queue().len(), 1);
    }

    #[test]
    fn sidecar_outro_advances_queue() {
        // One second of silence, then two of audio, at the scan rate
        let rate = crate::silence::SCAN_SAMPLE_RATE as usize;
        let mut pcm = vec![0.0; rate];
        pcm.extend(std::iter::repeat(0.5).take(rate * 2));
        let mut fx = fixture(ScriptedToolkit::succeeding(3_000).with_pcm(pcm));

        let cdg = song(fx.dir.path(), "K - Song.cdg");
        fs::write(fx.dir.path().join("K - Song.mp3"), b"audio").unwrap();
        let next = song(fx.dir.path(), "N - Next.mp4");
        let (cdg_id, next_id) = (cdg.id(), next.id());
        fx.session.add(cdg, true);
        fx.session.add(next, true);

        let events = pump_until(&mut fx, |e| matches!(e, SessionEvent::MarkersFound { .. }));
        let markers = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::MarkersFound { track, markers } if *track == cdg_id => Some(*markers),
                _ => None,
            })
            .unwrap();
        assert!(markers.outro_ms >= 3_000);
        assert_eq!(fx.session.queue().get(cdg_id).unwrap().markers(), Some(markers));

        fx.secondary.set_position(markers.outro_ms - 500);
        fx.session.ui_tick();
        assert_eq!(fx.session.queue().current().map(Track::id), Some(cdg_id));

        fx.secondary.set_position(markers.outro_ms);
        fx.session.ui_tick();
        assert_eq!(fx.session.queue().current().map(Track::id), Some(next_id));
    }

    #[test]
    fn idle_tick_rotates_only_when_idle() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        fx.session.idle_tick();
        assert_eq!(fx.primary.source().unwrap().file_name().unwrap(), "rain.mp4");

        let a = song(fx.dir.path(), "A - One.mp4");
        fx.session.add(a, true);
        let loaded = fx.primary.source();
        fx.session.idle_tick();
        assert_eq!(fx.primary.source(), loaded);
    }

    #[test]
    fn unknown_track_commands_are_rejected() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        let stray = TrackId::next();
        let events = fx.session.apply(SessionCommand::PlayNow(stray));
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::Rejected(QueueError::TrackNotFound(id))] if *id == stray
        ));
        assert!(matches!(fx.session.render(stray), Err(QueueError::TrackNotFound(_))));
    }

    #[test]
    fn run_applies_commands_until_shutdown() {
        let mut fx = fixture(ScriptedToolkit::succeeding(60_000));
        let a = song(fx.dir.path(), "A - One.mp4");
        let a_id = a.id();
        let (tx, rx) = unbounded();
        tx.send(SessionCommand::Add { track: a, autoplay: true }).unwrap();
        tx.send(SessionCommand::SeekForward).unwrap();
        tx.send(SessionCommand::PlayNow(TrackId::next())).unwrap();
        tx.send(SessionCommand::Shutdown).unwrap();

        let mut rejected = 0;
        fx.session.run(&rx, |event| {
            if matches!(event, SessionEvent::Rejected(_)) {
                rejected += 1;
            }
        });

        assert_eq!(rejected, 1);
        assert_eq!(fx.session.queue().current().map(Track::id), Some(a_id));
        assert_eq!(fx.primary.position(), 0, "engines stopped on shutdown");
        assert_eq!(fx.primary.state(), EngineState::Stopped);
    }
}
