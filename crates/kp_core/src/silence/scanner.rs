//! Background silence scans.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::detect::{find_bounds, SCAN_SAMPLE_RATE};
use super::{SilenceError, SilenceResult};
use crate::media::MediaToolkit;
use crate::models::{SilenceMarkers, TrackId};
use crate::render::CancelHandle;

/// Decode `path` and find its silence boundaries.
///
/// `Ok(None)` means the audio is silent throughout.
pub fn analyze(
    toolkit: &dyn MediaToolkit,
    path: &Path,
    cancel: &CancelHandle,
) -> SilenceResult<Option<SilenceMarkers>> {
    if !path.exists() {
        return Err(SilenceError::SourceMissing(path.to_path_buf()));
    }
    let samples = match toolkit.decode_mono_pcm(path, SCAN_SAMPLE_RATE, cancel) {
        Ok(samples) => samples,
        Err(_) if cancel.is_cancelled() => return Err(SilenceError::Cancelled),
        Err(source) => {
            return Err(SilenceError::Extraction {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if samples.is_empty() {
        return Err(SilenceError::NoSamples(path.to_path_buf()));
    }
    Ok(find_bounds(&samples, SCAN_SAMPLE_RATE))
}

/// Result of one background scan.
#[derive(Debug)]
pub struct SilenceMessage {
    pub track: TrackId,
    pub path: PathBuf,
    pub result: SilenceResult<Option<SilenceMarkers>>,
}

/// Runs scans on short-lived threads and hands results back over a channel.
pub struct SilenceScanner {
    toolkit: Arc<dyn MediaToolkit>,
    tx: Sender<SilenceMessage>,
    rx: Receiver<SilenceMessage>,
    running: Vec<RunningScan>,
}

struct RunningScan {
    cancel: CancelHandle,
    handle: JoinHandle<()>,
}

impl SilenceScanner {
    pub fn new(toolkit: Arc<dyn MediaToolkit>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            toolkit,
            tx,
            rx,
            running: Vec::new(),
        }
    }

    /// Channel results arrive on.
    pub fn messages(&self) -> &Receiver<SilenceMessage> {
        &self.rx
    }

    /// Start scanning `path` for `track`.
    pub fn scan(&mut self, track: TrackId, path: &Path) {
        self.reap();
        let toolkit = Arc::clone(&self.toolkit);
        let tx = self.tx.clone();
        let cancel = CancelHandle::new();
        let path = path.to_path_buf();
        tracing::debug!("Scanning {} for silence", path.display());

        let spawned = thread::Builder::new()
            .name("silence-scan".to_string())
            .spawn({
                let path = path.clone();
                let cancel = cancel.clone();
                move || {
                    let result = analyze(toolkit.as_ref(), &path, &cancel);
                    // Receiver gone means the scanner was dropped
                    let _ = tx.send(SilenceMessage { track, path, result });
                }
            });

        match spawned {
            Ok(handle) => self.running.push(RunningScan { cancel, handle }),
            Err(e) => {
                tracing::warn!("Could not start silence scan for {}: {}", path.display(), e);
            }
        }
    }

    /// Scans still running.
    pub fn active_count(&mut self) -> usize {
        self.reap();
        self.running.len()
    }

    /// Results that have arrived so far.
    pub fn drain(&self) -> Vec<SilenceMessage> {
        self.rx.try_iter().collect()
    }

    /// Ask every running scan to stop. Each still reports a
    /// [`SilenceError::Cancelled`] result.
    pub fn cancel_all(&self) {
        for scan in &self.running {
            scan.cancel.cancel();
        }
    }

    /// Cancel running scans and wait for their threads to exit.
    pub fn shutdown(&mut self) {
        self.cancel_all();
        for scan in self.running.drain(..) {
            if scan.handle.join().is_err() {
                tracing::error!("Silence scan thread panicked");
            }
        }
    }

    fn reap(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.running.drain(..).partition(|s| s.handle.is_finished());
        self.running = running;
        for scan in finished {
            if scan.handle.join().is_err() {
                tracing::error!("Silence scan thread panicked");
            }
        }
    }
}

impl Drop for SilenceScanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Gate, ScriptedToolkit};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn tone_with_lead_in() -> Vec<f32> {
        let mut pcm = vec![0.0; SCAN_SAMPLE_RATE as usize];
        pcm.extend(std::iter::repeat(0.4).take(SCAN_SAMPLE_RATE as usize * 2));
        pcm
    }

    #[test]
    fn analyze_reports_markers() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("s.mp3");
        fs::write(&audio, b"x").unwrap();
        let toolkit = ScriptedToolkit::succeeding(3_000).with_pcm(tone_with_lead_in());

        let markers = analyze(&toolkit, &audio, &CancelHandle::new()).unwrap().unwrap();
        assert!(markers.intro_ms > 900 && markers.intro_ms <= 1_000);
        assert!(markers.outro_ms >= 3_000);
    }

    #[test]
    fn analyze_errors() {
        let dir = tempdir().unwrap();
        let toolkit = ScriptedToolkit::succeeding(3_000);
        let missing = dir.path().join("gone.mp3");
        assert!(matches!(
            analyze(&toolkit, &missing, &CancelHandle::new()),
            Err(SilenceError::SourceMissing(_))
        ));

        let audio = dir.path().join("s.mp3");
        fs::write(&audio, b"x").unwrap();
        assert!(matches!(
            analyze(&toolkit, &audio, &CancelHandle::new()),
            Err(SilenceError::NoSamples(_))
        ));
    }

    #[test]
    fn background_scan_reports_on_channel() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("s.mp3");
        fs::write(&audio, b"x").unwrap();
        let toolkit = Arc::new(ScriptedToolkit::succeeding(3_000).with_pcm(tone_with_lead_in()));
        let mut scanner = SilenceScanner::new(toolkit);

        let track = TrackId::next();
        scanner.scan(track, &audio);
        let message = scanner
            .messages()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(message.track, track);
        assert_eq!(message.path, audio);
        assert!(message.result.unwrap().is_some());

        scanner.shutdown();
        assert_eq!(scanner.active_count(), 0);
    }

    #[test]
    fn shutdown_cancels_running_scans() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("s.mp3");
        fs::write(&audio, b"x").unwrap();
        let gate = Gate::new();
        let toolkit = ScriptedToolkit::succeeding(3_000)
            .with_pcm(tone_with_lead_in())
            .held_by(gate.clone());
        let mut scanner = SilenceScanner::new(Arc::new(toolkit));

        let track = TrackId::next();
        scanner.scan(track, &audio);
        assert_eq!(scanner.active_count(), 1);

        // The decode is held until after shutdown has cancelled it
        let opener = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            gate.open();
        });
        scanner.shutdown();
        opener.join().unwrap();

        assert_eq!(scanner.active_count(), 0);
        let message = scanner.messages().try_recv().unwrap();
        assert_eq!(message.track, track);
        assert!(matches!(message.result, Err(SilenceError::Cancelled)));
    }

    #[test]
    fn cancelled_analyze_reports_cancellation() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("s.mp3");
        fs::write(&audio, b"x").unwrap();
        let toolkit = ScriptedToolkit::succeeding(3_000).with_pcm(tone_with_lead_in());

        let cancel = CancelHandle::new();
        cancel.cancel();
        assert!(matches!(
            analyze(&toolkit, &audio, &cancel),
            Err(SilenceError::Cancelled)
        ));
    }
}
