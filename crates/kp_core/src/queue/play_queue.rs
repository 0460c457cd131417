//! Ordered play queue with a cursor on the loaded track.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{format_mmss, RenderState, Track, TrackId};

/// Tracks in play order.
///
/// `cursor` is the index of the loaded track, or `None` when nothing from
/// the queue is loaded. When set it is always a valid index.
#[derive(Debug, Default)]
pub struct PlayQueue {
    tracks: Vec<Track>,
    cursor: Option<usize>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all tracks.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Get a track by index.
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Get a track by ID.
    pub fn get_by_id(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    /// Get a mutable track by ID.
    pub fn get_by_id_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id() == id)
    }

    pub fn position_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Point the cursor at `index`; out-of-range values clear it.
    pub fn set_cursor(&mut self, index: Option<usize>) {
        self.cursor = index.filter(|i| *i < self.tracks.len());
    }

    /// The loaded track.
    pub fn current(&self) -> Option<&Track> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    /// Append a track.
    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Insert a track at `index` (clamped), keeping the cursor on the same
    /// track.
    pub fn insert(&mut self, index: usize, track: Track) -> usize {
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
        if let Some(c) = self.cursor {
            if index <= c {
                self.cursor = Some(c + 1);
            }
        }
        index
    }

    /// Remove the track at `index`.
    ///
    /// Removing the loaded track clears the cursor; removing an earlier
    /// track shifts it back by one.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let track = self.tracks.remove(index);
        self.cursor = match self.cursor {
            Some(c) if c == index => None,
            Some(c) if c > index => Some(c - 1),
            other => other,
        };
        Some(track)
    }

    /// Move a track from one position to another.
    pub fn move_track(&mut self, from: usize, to: usize) {
        if from < self.tracks.len() && to < self.tracks.len() && from != to {
            self.keeping_cursor(|tracks| {
                let track = tracks.remove(from);
                tracks.insert(to, track);
            });
        }
    }

    /// Move selected tracks up by one position.
    pub fn move_up(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort();

        self.keeping_cursor(|tracks| {
            for &idx in &sorted {
                if idx > 0 && idx < tracks.len() {
                    tracks.swap(idx, idx - 1);
                }
            }
        });
    }

    /// Move selected tracks down by one position.
    pub fn move_down(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|a, b| b.cmp(a));

        self.keeping_cursor(|tracks| {
            for &idx in &sorted {
                if idx + 1 < tracks.len() {
                    tracks.swap(idx, idx + 1);
                }
            }
        });
    }

    /// Shuffle the tracks after the cursor (all of them when nothing is
    /// loaded). The loaded track and everything before it stay put.
    pub fn shuffle_upcoming<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let start = self.cursor.map_or(0, |c| c + 1);
        if start < self.tracks.len() {
            self.tracks[start..].shuffle(rng);
        }
    }

    /// Update a track's render state. Returns false if it is not queued.
    pub fn set_render_state(&mut self, id: TrackId, state: RenderState) -> bool {
        match self.get_by_id_mut(id) {
            Some(track) => {
                track.set_render_state(state);
                true
            }
            None => false,
        }
    }

    /// Time left to play, in milliseconds, at each track's tempo.
    ///
    /// `position_ms` is the playhead within the loaded track.
    pub fn remaining_duration_ms(&self, position_ms: u64) -> u64 {
        let (current, rest) = match self.cursor {
            Some(c) => (self.tracks.get(c), &self.tracks[(c + 1).min(self.tracks.len())..]),
            None => (None, &self.tracks[..]),
        };

        let current_left = current.map_or(0, |t| {
            let factor = t.controls().tempo_factor();
            let heard = if factor > 0.0 {
                (position_ms as f64 / factor) as u64
            } else {
                position_ms
            };
            t.effective_duration_ms().saturating_sub(heard)
        });
        current_left + rest.iter().map(Track::effective_duration_ms).sum::<u64>()
    }

    /// Header line: `Queue (N songs - m:ss)`.
    pub fn summary(&self, position_ms: u64) -> String {
        let n = self.tracks.len();
        let noun = if n == 1 { "song" } else { "songs" };
        format!(
            "Queue ({} {} - {})",
            n,
            noun,
            format_mmss(self.remaining_duration_ms(position_ms))
        )
    }

    /// Clear the queue.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cursor = None;
    }

    fn keeping_cursor(&mut self, f: impl FnOnce(&mut Vec<Track>)) {
        let current = self.current().map(Track::id);
        f(&mut self.tracks);
        self.cursor = current.and_then(|id| self.position_of(id));
    }
}
