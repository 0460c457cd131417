//! External media toolkit seam.
//!
//! The render worker and the silence scanner talk to ffmpeg/ffprobe only
//! through [`MediaToolkit`], so they can run against a scripted toolkit
//! in tests.

use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, Command, Stdio};

use super::probe::probe_duration_ms;
use super::progress::read_diagnostic_line;
use super::tools::MediaTools;
use super::transcode::TranscodePlan;
use crate::render::CancelHandle;

/// Bytes read from the decoder between cancellation checks.
const DECODE_CHUNK: usize = 64 * 1024;

/// Operations the player needs from the external media tools.
pub trait MediaToolkit: Send + Sync {
    /// Name used in logs and error messages.
    fn transcoder_name(&self) -> &str;

    /// Duration in milliseconds, `None` when unknown.
    fn probe_duration_ms(&self, path: &Path) -> Option<u64>;

    /// Start a transcode. Progress is read from the returned process.
    fn spawn_transcode(&self, plan: &TranscodePlan) -> io::Result<Box<dyn TranscodeProcess>>;

    /// Decode the audio of `path` to mono f32 samples at `sample_rate`.
    ///
    /// Fails with [`io::ErrorKind::Interrupted`] once `cancel` is set.
    fn decode_mono_pcm(&self, path: &Path, sample_rate: u32, cancel: &CancelHandle) -> io::Result<Vec<f32>>;
}

/// A running transcoder process.
pub trait TranscodeProcess: Send {
    /// Next diagnostic line, `None` once the stream closes.
    fn next_line(&mut self) -> io::Result<Option<String>>;

    /// Kill the process.
    fn terminate(&mut self) -> io::Result<()>;

    /// Wait for exit. `None` when the process was killed by a signal.
    fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// [`MediaToolkit`] backed by real ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    tools: MediaTools,
}

impl FfmpegToolkit {
    pub fn new(tools: MediaTools) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &MediaTools {
        &self.tools
    }
}

impl MediaToolkit for FfmpegToolkit {
    fn transcoder_name(&self) -> &str {
        "ffmpeg"
    }

    fn probe_duration_ms(&self, path: &Path) -> Option<u64> {
        probe_duration_ms(&self.tools.ffprobe, path)
    }

    fn spawn_transcode(&self, plan: &TranscodePlan) -> io::Result<Box<dyn TranscodeProcess>> {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.arg("-hide_banner")
            .args(plan.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        tracing::debug!("Running FFmpeg: {:?}", cmd);

        let mut child = cmd.spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture FFmpeg stderr"))?;

        Ok(Box::new(FfmpegProcess {
            child,
            stderr: BufReader::new(stderr),
        }))
    }

    fn decode_mono_pcm(&self, path: &Path, sample_rate: u32, cancel: &CancelHandle) -> io::Result<Vec<f32>> {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Source not found: {}", path.display()),
            ));
        }

        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.arg("-i")
            .arg(path)
            .arg("-vn") // No video
            .arg("-ac")
            .arg("1") // Mono
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-f")
            .arg("f32le")
            .arg("-acodec")
            .arg("pcm_f32le")
            .arg("pipe:1");

        cmd.stdin(Stdio::null())
            .stderr(Stdio::null())
            .stdout(Stdio::piped());

        tracing::debug!("Running FFmpeg: {:?}", cmd);

        let mut child = cmd.spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture FFmpeg stdout"))?;

        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; DECODE_CHUNK];
        loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(io::Error::new(io::ErrorKind::Interrupted, "decode cancelled"));
            }
            match stdout.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e);
                }
            }
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(io::Error::other(format!(
                "FFmpeg exited with code: {:?}",
                status.code()
            )));
        }

        Ok(bytes_to_f32_samples(&buffer))
    }
}

struct FfmpegProcess {
    child: Child,
    stderr: BufReader<ChildStderr>,
}

impl TranscodeProcess for FfmpegProcess {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        read_diagnostic_line(&mut self.stderr)
    }

    fn terminate(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.wait()?.code())
    }
}

/// Convert raw bytes to f32 samples (little-endian).
fn bytes_to_f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
