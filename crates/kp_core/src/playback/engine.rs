//! Playback engine seam and a wall-clock engine.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Transport state of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Asynchronous notification from an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    EndOfMedia,
    Error(String),
}

/// Which engine of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineRole {
    /// Visual stream.
    Primary,
    /// Audio stream.
    Secondary,
    /// Second-screen copy of the visual stream.
    Mirror,
}

impl fmt::Display for EngineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineRole::Primary => write!(f, "primary"),
            EngineRole::Secondary => write!(f, "secondary"),
            EngineRole::Mirror => write!(f, "mirror"),
        }
    }
}

/// A media player the synchronizer drives.
pub trait PlaybackEngine: Send {
    /// Replace the source; `None` unloads. Resets the position to 0.
    fn set_source(&mut self, source: Option<&Path>);
    fn source(&self) -> Option<PathBuf>;

    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn state(&self) -> EngineState;

    fn position_ms(&self) -> u64;
    fn set_position_ms(&mut self, position_ms: u64);
    /// Duration of the loaded source, 0 when unknown.
    fn duration_ms(&self) -> u64;

    fn rate(&self) -> f64;
    fn set_rate(&mut self, rate: f64);
    fn set_looping(&mut self, looping: bool);

    /// Next pending event, if any.
    fn poll_event(&mut self) -> Option<EngineEvent>;
}

/// Looks up a source's duration.
pub type DurationLookup = Arc<dyn Fn(&Path) -> Option<u64> + Send + Sync>;

/// Engine that advances a virtual playhead with the wall clock.
///
/// Used by the CLI to run the session without a real media backend.
/// Missing sources raise an error event; reaching the duration raises
/// end-of-media (or wraps when looping).
pub struct ClockEngine {
    source: Option<PathBuf>,
    state: EngineState,
    rate: f64,
    looping: bool,
    /// Playhead at `anchor`.
    base_ms: f64,
    anchor: Instant,
    duration_ms: u64,
    lookup: Option<DurationLookup>,
    events: VecDeque<EngineEvent>,
}

impl ClockEngine {
    pub fn new() -> Self {
        Self {
            source: None,
            state: EngineState::Stopped,
            rate: 1.0,
            looping: false,
            base_ms: 0.0,
            anchor: Instant::now(),
            duration_ms: 0,
            lookup: None,
            events: VecDeque::new(),
        }
    }

    /// Resolve durations of new sources with `lookup`.
    pub fn with_duration_lookup(mut self, lookup: DurationLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    fn raw_position_ms(&self) -> f64 {
        match self.state {
            EngineState::Playing => {
                self.base_ms + self.anchor.elapsed().as_secs_f64() * 1000.0 * self.rate
            }
            _ => self.base_ms,
        }
    }

    fn rebase(&mut self, position_ms: f64) {
        self.base_ms = position_ms.max(0.0);
        self.anchor = Instant::now();
    }
}

impl Default for ClockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for ClockEngine {
    fn set_source(&mut self, source: Option<&Path>) {
        self.state = EngineState::Stopped;
        self.rebase(0.0);
        self.duration_ms = 0;
        self.source = source.map(Path::to_path_buf);

        if let Some(path) = source {
            if !path.exists() {
                self.events
                    .push_back(EngineEvent::Error(format!("Cannot open {}", path.display())));
                return;
            }
            if let Some(lookup) = &self.lookup {
                self.duration_ms = lookup(path).unwrap_or(0);
            }
        }
    }

    fn source(&self) -> Option<PathBuf> {
        self.source.clone()
    }

    fn play(&mut self) {
        if self.source.is_none() || self.state == EngineState::Playing {
            return;
        }
        let position = self.raw_position_ms();
        self.state = EngineState::Playing;
        self.rebase(position);
    }

    fn pause(&mut self) {
        if self.state == EngineState::Playing {
            let position = self.raw_position_ms();
            self.state = EngineState::Paused;
            self.rebase(position);
        }
    }

    fn stop(&mut self) {
        self.state = EngineState::Stopped;
        self.rebase(0.0);
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn position_ms(&self) -> u64 {
        let position = self.raw_position_ms() as u64;
        if self.duration_ms == 0 {
            return position;
        }
        if self.looping {
            position % self.duration_ms
        } else {
            position.min(self.duration_ms)
        }
    }

    fn set_position_ms(&mut self, position_ms: u64) {
        self.rebase(position_ms as f64);
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn set_rate(&mut self, rate: f64) {
        if rate <= 0.0 {
            return;
        }
        let position = self.raw_position_ms();
        self.rate = rate;
        self.rebase(position);
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn poll_event(&mut self) -> Option<EngineEvent> {
        if self.state == EngineState::Playing && self.duration_ms > 0 {
            let position = self.raw_position_ms();
            if position >= self.duration_ms as f64 {
                if self.looping {
                    self.rebase(position % self.duration_ms as f64);
                } else {
                    self.state = EngineState::Stopped;
                    self.rebase(self.duration_ms as f64);
                    self.events.push_back(EngineEvent::EndOfMedia);
                }
            }
        }
        self.events.pop_front()
    }
}
