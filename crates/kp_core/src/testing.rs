//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::media::{MediaToolkit, TranscodePlan, TranscodeProcess};
use crate::models::{Track, TrackId};
use crate::playback::{EngineEvent, EngineState, PlaybackEngine};
use crate::queue::PlaybackControl;
use crate::render::CancelHandle;

/// One-shot latch a scripted process waits on before producing output.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cv) = &*self.inner;
        *lock.lock() = true;
        cv.notify_all();
    }

    fn wait(&self) {
        let (lock, cv) = &*self.inner;
        let mut open = lock.lock();
        while !*open {
            cv.wait(&mut open);
        }
    }
}

/// [`MediaToolkit`] that replays canned transcoder output.
pub struct ScriptedToolkit {
    duration_ms: Option<u64>,
    lines: Vec<String>,
    exit_code: Option<i32>,
    gate: Option<Gate>,
    pcm: Vec<f32>,
    transcodes: AtomicUsize,
    terminations: Arc<AtomicUsize>,
    plans: Mutex<Vec<TranscodePlan>>,
}

impl ScriptedToolkit {
    /// Transcodes succeed, writing the output and reporting progress in
    /// quarters of `duration_ms`.
    pub fn succeeding(duration_ms: u64) -> Self {
        let total = duration_ms as f64 / 1000.0;
        let lines = (1..=4)
            .map(|q| {
                let secs = total * q as f64 / 4.0;
                format!(
                    "frame={} size=N/A time=00:{:02}:{:05.2} bitrate=N/A speed=1.0x",
                    q * 10,
                    (secs / 60.0) as u64,
                    secs % 60.0
                )
            })
            .collect();
        Self {
            duration_ms: Some(duration_ms),
            lines,
            exit_code: Some(0),
            gate: None,
            pcm: Vec::new(),
            transcodes: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
            plans: Mutex::new(Vec::new()),
        }
    }

    /// Transcodes print `lines` and exit with `exit_code`.
    pub fn failing(exit_code: i32, lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            exit_code: Some(exit_code),
            ..Self::succeeding(60_000)
        }
    }

    pub fn with_duration(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Hold every transcode's output and every decode until `gate` opens.
    pub fn held_by(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_pcm(mut self, pcm: Vec<f32>) -> Self {
        self.pcm = pcm;
        self
    }

    pub fn transcode_count(&self) -> usize {
        self.transcodes.load(Ordering::SeqCst)
    }

    pub fn last_plan(&self) -> Option<TranscodePlan> {
        self.plans.lock().last().cloned()
    }

    /// Processes killed so far.
    pub fn termination_count(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl MediaToolkit for ScriptedToolkit {
    fn transcoder_name(&self) -> &str {
        "ffmpeg"
    }

    fn probe_duration_ms(&self, _path: &Path) -> Option<u64> {
        self.duration_ms
    }

    fn spawn_transcode(&self, plan: &TranscodePlan) -> io::Result<Box<dyn TranscodeProcess>> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        self.plans.lock().push(plan.clone());
        Ok(Box::new(ScriptedProcess {
            lines: self.lines.iter().cloned().collect(),
            output: plan.output().to_path_buf(),
            exit_code: self.exit_code,
            gate: self.gate.clone(),
            terminated: false,
            terminations: Arc::clone(&self.terminations),
        }))
    }

    fn decode_mono_pcm(&self, path: &Path, _sample_rate: u32, cancel: &CancelHandle) -> io::Result<Vec<f32>> {
        if !path.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        }
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "decode cancelled"));
        }
        Ok(self.pcm.clone())
    }
}

struct ScriptedProcess {
    lines: VecDeque<String>,
    output: PathBuf,
    exit_code: Option<i32>,
    gate: Option<Gate>,
    /// Set by `terminate` on this process only.
    terminated: bool,
    terminations: Arc<AtomicUsize>,
}

impl TranscodeProcess for ScriptedProcess {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(gate) = self.gate.take() {
            gate.wait();
        }
        if self.terminated {
            return Ok(None);
        }
        Ok(self.lines.pop_front())
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.terminated {
            self.terminated = true;
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        if self.terminated {
            return Ok(None);
        }
        if self.exit_code == Some(0) {
            fs::write(&self.output, b"rendered")?;
        }
        Ok(self.exit_code)
    }
}

#[derive(Debug, Default)]
struct EngineSlot {
    source: Option<PathBuf>,
    state: EngineState,
    position_ms: u64,
    duration_ms: u64,
    rate: f64,
    looping: bool,
    events: VecDeque<EngineEvent>,
}

/// [`PlaybackEngine`] whose clock only moves when a test moves it.
///
/// Clones share state, so a test keeps one clone while the synchronizer
/// owns another.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    slot: Arc<Mutex<EngineSlot>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(EngineSlot {
                rate: 1.0,
                ..EngineSlot::default()
            })),
        }
    }

    pub fn position(&self) -> u64 {
        self.slot.lock().position_ms
    }

    pub fn set_position(&self, position_ms: u64) {
        self.slot.lock().position_ms = position_ms;
    }

    pub fn set_duration(&self, duration_ms: u64) {
        self.slot.lock().duration_ms = duration_ms;
    }

    /// Change the rate behind the synchronizer's back.
    pub fn set_rate_directly(&self, rate: f64) {
        self.slot.lock().rate = rate;
    }

    pub fn looping(&self) -> bool {
        self.slot.lock().looping
    }

    pub fn push_event(&self, event: EngineEvent) {
        self.slot.lock().events.push_back(event);
    }
}

impl PlaybackEngine for ScriptedEngine {
    fn set_source(&mut self, source: Option<&Path>) {
        let mut slot = self.slot.lock();
        slot.source = source.map(Path::to_path_buf);
        slot.state = EngineState::Stopped;
        slot.position_ms = 0;
    }

    fn source(&self) -> Option<PathBuf> {
        self.slot.lock().source.clone()
    }

    fn play(&mut self) {
        let mut slot = self.slot.lock();
        if slot.source.is_some() {
            slot.state = EngineState::Playing;
        }
    }

    fn pause(&mut self) {
        let mut slot = self.slot.lock();
        if slot.state == EngineState::Playing {
            slot.state = EngineState::Paused;
        }
    }

    fn stop(&mut self) {
        let mut slot = self.slot.lock();
        slot.state = EngineState::Stopped;
        slot.position_ms = 0;
    }

    fn state(&self) -> EngineState {
        self.slot.lock().state
    }

    fn position_ms(&self) -> u64 {
        self.slot.lock().position_ms
    }

    fn set_position_ms(&mut self, position_ms: u64) {
        self.slot.lock().position_ms = position_ms;
    }

    fn duration_ms(&self) -> u64 {
        self.slot.lock().duration_ms
    }

    fn rate(&self) -> f64 {
        self.slot.lock().rate
    }

    fn set_rate(&mut self, rate: f64) {
        self.slot.lock().rate = rate;
    }

    fn set_looping(&mut self, looping: bool) {
        self.slot.lock().looping = looping;
    }

    fn poll_event(&mut self) -> Option<EngineEvent> {
        self.slot.lock().events.pop_front()
    }
}

/// [`PlaybackControl`] that records what the queue asked for.
#[derive(Debug, Default)]
pub struct RecordingPlayer {
    pub loaded: Vec<Track>,
    pub stop_count: usize,
    pub idle_count: usize,
}

impl RecordingPlayer {
    pub fn loaded_ids(&self) -> Vec<TrackId> {
        self.loaded.iter().map(Track::id).collect()
    }
}

impl PlaybackControl for RecordingPlayer {
    fn load_and_play(&mut self, track: &Track) {
        self.loaded.push(track.clone());
    }

    fn stop(&mut self) {
        self.stop_count += 1;
    }

    fn enter_idle(&mut self) {
        self.idle_count += 1;
    }
}
