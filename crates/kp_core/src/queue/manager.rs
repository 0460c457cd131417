//! Queue coordination: advancing, play-now, removal, and render hand-off.

use std::collections::HashSet;

use rand::Rng;

use super::errors::{QueueError, QueueResult};
use super::play_queue::PlayQueue;
use crate::history::HistoryLog;
use crate::media::AssetResolver;
use crate::models::{RenderState, ShiftControls, SilenceMarkers, Track, TrackId};
use crate::render::{RenderCoordinator, RenderIntent, RenderRequest};

/// What the queue needs from the player.
pub trait PlaybackControl {
    /// Load `track` and start playing it.
    fn load_and_play(&mut self, track: &Track);

    /// Stop playback of the loaded track.
    fn stop(&mut self);

    /// Nothing left to play: show the idle clip.
    fn enter_idle(&mut self);
}

/// Result of adding a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// In the queue at `index`.
    Queued { index: usize },
    /// Waiting for its key/tempo render; joins the queue when done.
    Rendering { track: TrackId },
}

/// Owns the play queue and the play history.
#[derive(Debug)]
pub struct QueueManager {
    queue: PlayQueue,
    history: HistoryLog,
    resolver: AssetResolver,
}

impl QueueManager {
    pub fn new(history: HistoryLog, resolver: AssetResolver) -> Self {
        Self {
            queue: PlayQueue::new(),
            history,
            resolver,
        }
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.queue.cursor()
    }

    pub fn current(&self) -> Option<&Track> {
        self.queue.current()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.queue.get_by_id(id)
    }

    /// Add a track to the end of the queue.
    ///
    /// A cached render for its controls is attached directly; otherwise a
    /// track with non-default controls is rendered first and appended when
    /// the render completes.
    pub fn add(&mut self, mut track: Track, renders: &mut RenderCoordinator) -> AddOutcome {
        if !track.controls().is_default() && track.shifted().is_none() {
            let cached = self.resolver.cached_asset(&track);
            track.set_shifted(cached);
        }

        if track.controls().is_default() || !track.shifted().is_none() {
            tracing::info!("Queued {}", track.file_name());
            self.queue.push(track);
            return AddOutcome::Queued {
                index: self.queue.len() - 1,
            };
        }

        let id = track.id();
        match RenderRequest::new(track, RenderIntent::AppendToQueue) {
            Some(request) => {
                renders.enqueue(request, self);
                AddOutcome::Rendering { track: id }
            }
            None => AddOutcome::Queued {
                index: self.queue.len().saturating_sub(1),
            },
        }
    }

    /// Start the queue from the head when nothing is loaded.
    ///
    /// Returns false if something is already loaded or the queue is empty.
    pub fn start_if_idle(&mut self, player: &mut dyn PlaybackControl) -> bool {
        if self.queue.cursor().is_some() || self.queue.is_empty() {
            return false;
        }
        self.queue.set_cursor(Some(0));
        self.load_at(0, player);
        true
    }

    /// Advance past the loaded track.
    ///
    /// The loaded track is removed and recorded in history. An emptied
    /// queue sends the player idle; otherwise the next track (wrapping to
    /// the head) is loaded. Tracks still rendering load unshifted.
    pub fn play_next(&mut self, player: &mut dyn PlaybackControl) -> Option<TrackId> {
        if self.queue.is_empty() {
            return None;
        }

        let base = match self.queue.cursor() {
            Some(idx) => {
                player.stop();
                if let Some(finished) = self.queue.remove(idx) {
                    self.record_play(&finished);
                }
                idx.checked_sub(1)
            }
            None => None,
        };

        if self.queue.is_empty() {
            self.queue.set_cursor(None);
            player.enter_idle();
            return None;
        }

        let mut next = base.map_or(0, |c| c + 1);
        if next >= self.queue.len() {
            next = 0;
        }
        self.queue.set_cursor(Some(next));
        self.load_at(next, player)
    }

    /// Play `id` immediately.
    ///
    /// The loaded track is stopped and recorded in history, `id` moves to
    /// the head, and the queue advances onto it.
    pub fn play_now(&mut self, id: TrackId, player: &mut dyn PlaybackControl) -> QueueResult<()> {
        let target = self.queue.get_by_id(id).ok_or(QueueError::TrackNotFound(id))?;
        if target.is_rendering() {
            return Err(QueueError::TrackRendering(target.file_name()));
        }

        let mut target = None;
        if let Some(cur) = self.queue.cursor() {
            player.stop();
            if let Some(previous) = self.queue.remove(cur) {
                self.record_play(&previous);
                if previous.id() == id {
                    target = Some(previous);
                }
            }
        }

        let target = match target {
            Some(t) => t,
            None => {
                let pos = self
                    .queue
                    .position_of(id)
                    .ok_or_else(|| QueueError::InvariantViolation(format!("track {} vanished", id)))?;
                self.queue
                    .remove(pos)
                    .ok_or_else(|| QueueError::InvariantViolation(format!("track {} vanished", id)))?
            }
        };

        self.queue.set_cursor(None);
        self.queue.insert(0, target);
        self.play_next(player);
        Ok(())
    }

    /// Remove tracks by id. Returns how many were removed.
    ///
    /// Removing the loaded track stops playback and leaves nothing loaded.
    pub fn remove(&mut self, ids: &[TrackId], player: &mut dyn PlaybackControl) -> usize {
        let mut removed = 0;
        for &id in ids {
            let Some(pos) = self.queue.position_of(id) else {
                continue;
            };
            if self.queue.cursor() == Some(pos) {
                player.stop();
            }
            if self.queue.remove(pos).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Shuffle everything after the loaded track.
    pub fn shuffle_upcoming<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.queue.shuffle_upcoming(rng);
    }

    pub fn move_track(&mut self, from: usize, to: usize) {
        self.queue.move_track(from, to);
    }

    pub fn move_up(&mut self, indices: &[usize]) {
        self.queue.move_up(indices);
    }

    pub fn move_down(&mut self, indices: &[usize]) {
        self.queue.move_down(indices);
    }

    pub fn set_render_state(&mut self, id: TrackId, state: RenderState) -> bool {
        self.queue.set_render_state(id, state)
    }

    /// Replace a queued track's controls, attaching a cached render if one
    /// exists. Returns the updated track.
    pub fn set_controls(&mut self, id: TrackId, controls: ShiftControls) -> Option<&Track> {
        let cached = {
            let track = self.queue.get_by_id(id)?;
            let mut candidate = track.clone();
            candidate.set_controls(controls);
            self.resolver.cached_asset(&candidate)
        };
        let track = self.queue.get_by_id_mut(id)?;
        track.set_controls(controls);
        if !cached.is_none() {
            track.set_shifted(cached);
        }
        Some(track)
    }

    pub fn set_markers(&mut self, id: TrackId, markers: SilenceMarkers) -> bool {
        match self.queue.get_by_id_mut(id) {
            Some(track) => {
                track.set_markers(markers);
                true
            }
            None => false,
        }
    }

    pub fn set_duration_ms(&mut self, id: TrackId, duration_ms: u64) -> bool {
        match self.queue.get_by_id_mut(id) {
            Some(track) => {
                track.set_duration_ms(duration_ms);
                true
            }
            None => false,
        }
    }

    /// Put a freshly rendered track in place of the loaded one and play it.
    ///
    /// The displaced track is not recorded in history.
    pub fn promote_and_play(&mut self, track: Track, player: &mut dyn PlaybackControl) {
        let id = track.id();
        let mut insert_at = self.queue.cursor().unwrap_or(0);

        if let Some(pos) = self.queue.position_of(id) {
            if self.queue.cursor() == Some(pos) {
                player.stop();
            } else if pos < insert_at {
                insert_at -= 1;
            }
            self.queue.remove(pos);
        }

        let index = self.queue.insert(insert_at, track);
        self.queue.set_cursor(Some(index));
        self.load_at(index, player);
    }

    /// Queue a freshly rendered track.
    ///
    /// With nothing loaded it goes to the head and starts playing;
    /// otherwise it is appended.
    pub fn append_rendered(&mut self, track: Track, player: &mut dyn PlaybackControl) {
        if let Some(pos) = self.queue.position_of(track.id()) {
            if self.queue.cursor() == Some(pos) {
                player.stop();
            }
            self.queue.remove(pos);
        }

        tracing::info!("Render ready, queueing {}", track.file_name());
        if self.queue.cursor().is_none() {
            self.queue.insert(0, track);
            self.play_next(player);
        } else {
            self.queue.push(track);
        }
    }

    /// Time left to play in milliseconds.
    pub fn remaining_duration_ms(&self, position_ms: u64) -> u64 {
        self.queue.remaining_duration_ms(position_ms)
    }

    pub fn summary(&self, position_ms: u64) -> String {
        self.queue.summary(position_ms)
    }

    /// Verify cursor bounds and id uniqueness.
    pub fn check_invariants(&self) -> QueueResult<()> {
        if let Some(c) = self.queue.cursor() {
            if c >= self.queue.len() {
                return Err(QueueError::InvariantViolation(format!(
                    "cursor {} past end of {}-track queue",
                    c,
                    self.queue.len()
                )));
            }
        }
        let mut seen = HashSet::new();
        for track in self.queue.tracks() {
            if !seen.insert(track.id()) {
                return Err(QueueError::InvariantViolation(format!(
                    "track {} queued twice",
                    track.id()
                )));
            }
        }
        Ok(())
    }

    fn load_at(&self, index: usize, player: &mut dyn PlaybackControl) -> Option<TrackId> {
        let track = self.queue.get(index)?;
        if track.is_rendering() {
            tracing::info!("{} is still rendering, playing it unshifted", track.file_name());
            player.load_and_play(&track.unshifted_placeholder());
        } else {
            player.load_and_play(track);
        }
        Some(track.id())
    }

    fn record_play(&mut self, track: &Track) {
        if let Err(e) = self.history.append(track) {
            tracing::warn!("Failed to record {} in history: {}", track.file_name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerKind;
    use crate::testing::RecordingPlayer;

    fn make_track(name: &str) -> Track {
        Track::new(format!("/songs/{}.mp4", name), ContainerKind::GenericVideo).with_duration_ms(1000)
    }

    fn manager_with(names: &[&str]) -> (QueueManager, Vec<TrackId>) {
        let mut mgr = QueueManager::new(HistoryLog::in_memory(), AssetResolver::new("/cache", "flac"));
        let mut ids = Vec::new();
        for n in names {
            let t = make_track(n);
            ids.push(t.id());
            mgr.queue.push(t);
        }
        (mgr, ids)
    }

    fn stems(mgr: &QueueManager) -> Vec<String> {
        mgr.queue().tracks().iter().map(|t| t.stem()).collect()
    }

    #[test]
    fn play_next_from_nothing_loaded_starts_head() {
        let (mut mgr, ids) = manager_with(&["a", "b"]);
        let mut player = RecordingPlayer::default();

        assert_eq!(mgr.play_next(&mut player), Some(ids[0]));
        assert_eq!(mgr.cursor(), Some(0));
        assert_eq!(player.loaded_ids(), vec![ids[0]]);
        assert!(mgr.history().recorded().is_empty());
    }

    #[test]
    fn play_next_removes_and_records_finished_track() {
        let (mut mgr, ids) = manager_with(&["a", "b", "c"]);
        let mut player = RecordingPlayer::default();
        mgr.start_if_idle(&mut player);

        assert_eq!(mgr.play_next(&mut player), Some(ids[1]));
        assert_eq!(stems(&mgr), vec!["b", "c"]);
        assert_eq!(mgr.cursor(), Some(0));
        assert_eq!(mgr.history().recorded().len(), 1);
        assert_eq!(mgr.history().recorded()[0].file_name, "a.mp4");
        mgr.check_invariants().unwrap();
    }

    #[test]
    fn play_next_wraps_to_head() {
        let (mut mgr, ids) = manager_with(&["a", "b", "c"]);
        let mut player = RecordingPlayer::default();
        mgr.queue.set_cursor(Some(2));

        assert_eq!(mgr.play_next(&mut player), Some(ids[0]));
        assert_eq!(mgr.cursor(), Some(0));
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn last_track_finishing_goes_idle() {
        let (mut mgr, _) = manager_with(&["a"]);
        let mut player = RecordingPlayer::default();
        mgr.start_if_idle(&mut player);

        assert_eq!(mgr.play_next(&mut player), None);
        assert!(mgr.is_empty());
        assert_eq!(mgr.cursor(), None);
        assert_eq!(player.idle_count, 1);
        assert_eq!(mgr.history().recorded().len(), 1);
    }

    #[test]
    fn play_next_on_empty_queue_does_nothing() {
        let (mut mgr, _) = manager_with(&[]);
        let mut player = RecordingPlayer::default();
        assert_eq!(mgr.play_next(&mut player), None);
        assert_eq!(player.idle_count, 0);
    }

    #[test]
    fn play_now_moves_target_to_head() {
        let (mut mgr, ids) = manager_with(&["a", "b", "c"]);
        let mut player = RecordingPlayer::default();
        mgr.start_if_idle(&mut player);

        mgr.play_now(ids[2], &mut player).unwrap();
        assert_eq!(stems(&mgr), vec!["c", "b"]);
        assert_eq!(mgr.cursor(), Some(0));
        assert_eq!(mgr.current().unwrap().id(), ids[2]);
        assert_eq!(mgr.history().recorded().len(), 1);
        assert_eq!(player.loaded_ids().last(), Some(&ids[2]));
    }

    #[test]
    fn play_now_rejects_rendering_track() {
        let (mut mgr, ids) = manager_with(&["a", "b"]);
        let mut player = RecordingPlayer::default();
        mgr.set_render_state(ids[1], RenderState::Rendering);

        let err = mgr.play_now(ids[1], &mut player).unwrap_err();
        assert_eq!(err, QueueError::TrackRendering("b.mp4".to_string()));
        assert!(player.loaded_ids().is_empty());

        let missing = TrackId::next();
        assert_eq!(
            mgr.play_now(missing, &mut player),
            Err(QueueError::TrackNotFound(missing))
        );
    }

    #[test]
    fn removing_loaded_track_stops_and_clears_cursor() {
        let (mut mgr, ids) = manager_with(&["a", "b", "c"]);
        let mut player = RecordingPlayer::default();
        mgr.queue.set_cursor(Some(1));

        assert_eq!(mgr.remove(&[ids[1]], &mut player), 1);
        assert_eq!(mgr.cursor(), None);
        assert_eq!(player.stop_count, 1);

        // Next advance starts from the head
        assert_eq!(mgr.play_next(&mut player), Some(ids[0]));
    }

    #[test]
    fn removing_earlier_track_keeps_cursor_on_loaded_one() {
        let (mut mgr, ids) = manager_with(&["a", "b", "c"]);
        let mut player = RecordingPlayer::default();
        mgr.queue.set_cursor(Some(2));

        mgr.remove(&[ids[0]], &mut player);
        assert_eq!(mgr.current().unwrap().id(), ids[2]);
        assert_eq!(player.stop_count, 0);
    }

    #[test]
    fn rendering_track_loads_unshifted() {
        let (mut mgr, ids) = manager_with(&["a", "b"]);
        let mut player = RecordingPlayer::default();
        mgr.set_controls(ids[1], ShiftControls::new(2, 0));
        mgr.set_render_state(ids[1], RenderState::Rendering);
        mgr.queue.set_cursor(Some(0));

        mgr.play_next(&mut player);
        let loaded = player.loaded.last().unwrap();
        assert_eq!(loaded.id(), ids[1]);
        assert!(loaded.controls().is_default());
        assert_eq!(mgr.current().unwrap().controls(), ShiftControls::new(2, 0));
    }

    #[test]
    fn promote_replaces_current_without_history() {
        let (mut mgr, ids) = manager_with(&["a", "b", "c"]);
        let mut player = RecordingPlayer::default();
        mgr.queue.set_cursor(Some(1));

        let mut rendered = mgr.get(ids[1]).unwrap().clone();
        rendered.set_controls(ShiftControls::new(1, 0));
        mgr.promote_and_play(rendered, &mut player);

        assert_eq!(stems(&mgr), vec!["a", "b", "c"]);
        assert_eq!(mgr.cursor(), Some(1));
        assert_eq!(mgr.current().unwrap().controls(), ShiftControls::new(1, 0));
        assert!(mgr.history().recorded().is_empty());
        mgr.check_invariants().unwrap();
    }

    #[test]
    fn append_rendered_starts_queue_when_nothing_loaded() {
        let (mut mgr, _) = manager_with(&["a"]);
        let mut player = RecordingPlayer::default();

        let t = make_track("new").with_controls(ShiftControls::new(0, 1));
        let id = t.id();
        mgr.append_rendered(t, &mut player);

        assert_eq!(stems(&mgr), vec!["new", "a"]);
        assert_eq!(mgr.cursor(), Some(0));
        assert_eq!(player.loaded_ids(), vec![id]);
    }

    #[test]
    fn append_rendered_appends_when_playing() {
        let (mut mgr, _) = manager_with(&["a"]);
        let mut player = RecordingPlayer::default();
        mgr.start_if_idle(&mut player);

        mgr.append_rendered(make_track("new"), &mut player);
        assert_eq!(stems(&mgr), vec!["a", "new"]);
        assert_eq!(mgr.cursor(), Some(0));
        assert_eq!(player.loaded.len(), 1);
    }
}
