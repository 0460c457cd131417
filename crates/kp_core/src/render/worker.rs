//! Key/tempo render worker.
//!
//! Runs one render at a time on a background thread:
//! 1. Resolve the cache path; reuse an existing render
//! 2. Probe the duration for progress reporting
//! 3. Transcode into a hidden partial file next to the final one
//! 4. Move the partial file into place once the transcoder succeeds
//!
//! Cancellation is checked on every transcoder output line. A cancelled
//! or failed render never leaves a file at the resolved cache path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::Sender;

use super::errors::{RenderError, RenderResult};
use super::types::{CancelHandle, RenderJob, RenderMessage, RenderOutput, RenderProgress};
use crate::logging::{LogConfig, RenderLogger};
use crate::media::progress::{estimate_remaining, parse_time_token, percent_complete};
use crate::media::{AssetResolver, CodecSettings, MediaToolkit, TranscodePlan, TranscodeProcess};

/// Transcoder lines quoted in a failure message.
const FAILURE_EXCERPT_LINES: usize = 3;

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Renders shifted assets into the cache.
pub struct ShiftRenderWorker {
    toolkit: Arc<dyn MediaToolkit>,
    resolver: AssetResolver,
    codecs: CodecSettings,
    /// Folder for per-render log files; `None` keeps logs in memory.
    log_dir: Option<PathBuf>,
    log_config: LogConfig,
}

impl ShiftRenderWorker {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, resolver: AssetResolver, codecs: CodecSettings) -> Self {
        Self {
            toolkit,
            resolver,
            codecs,
            log_dir: None,
            log_config: LogConfig::default(),
        }
    }

    /// Write a log file per render into `log_dir`.
    pub fn with_logs(mut self, log_dir: impl Into<PathBuf>, config: LogConfig) -> Self {
        self.log_dir = Some(log_dir.into());
        self.log_config = config;
        self
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    pub fn toolkit(&self) -> &Arc<dyn MediaToolkit> {
        &self.toolkit
    }

    /// Render `job` on the calling thread.
    pub fn run(
        &self,
        job: &RenderJob,
        cancel: &CancelHandle,
        on_progress: &mut dyn FnMut(RenderProgress),
    ) -> RenderResult<RenderOutput> {
        if !job.source_path.exists() {
            return Err(RenderError::SourceMissing(job.source_path.clone()));
        }
        if !job.audio_source.exists() {
            return Err(RenderError::SourceMissing(job.audio_source.clone()));
        }

        let Some(output) = self
            .resolver
            .resolve_for(&job.source_path, job.container, job.controls)
        else {
            return Ok(RenderOutput::NoOp);
        };

        if output.is_file() {
            tracing::info!("Using cached render {}", output.display());
            return Ok(RenderOutput::CacheHit(output));
        }

        let total_ms = self
            .toolkit
            .probe_duration_ms(&job.audio_source)
            .filter(|ms| *ms > 0)
            .ok_or_else(|| RenderError::ProbeFailed(job.audio_source.display().to_string()))?;

        fs::create_dir_all(self.resolver.cache_dir())
            .map_err(|e| RenderError::io("creating render cache", e))?;

        let partial = partial_path(&output);
        let Some(plan) = TranscodePlan::new(
            &job.audio_source,
            &partial,
            job.container,
            job.controls.pitch_factor(),
            job.controls.tempo_factor(),
            self.codecs.clone(),
        ) else {
            return Ok(RenderOutput::NoOp);
        };

        let logger = self.open_logger(job);
        logger.phase("Key/Tempo Render");
        logger.info(&format!(
            "{} -> {} (key {}, tempo {})",
            job.source_path.display(),
            output.display(),
            job.controls.key_label(),
            job.controls.tempo_label()
        ));
        logger.command(&plan.display_command(self.toolkit.transcoder_name()));

        let mut process = self
            .toolkit
            .spawn_transcode(&plan)
            .map_err(|e| RenderError::io(format!("starting {}", self.toolkit.transcoder_name()), e))?;

        let result = self.drive(&mut *process, &logger, total_ms, cancel, on_progress);
        let result = result.and_then(|()| self.finish(&mut *process, &logger, &partial, &output));

        if let Err(e) = &result {
            remove_partial(&partial);
            if e.is_cancelled() {
                logger.warn("Render cancelled");
            } else {
                logger.error(&e.to_string());
                logger.show_tail(self.toolkit.transcoder_name());
            }
        }
        logger.close();
        result
    }

    /// Pump transcoder output until it closes, reporting progress.
    fn drive(
        &self,
        process: &mut dyn TranscodeProcess,
        logger: &RenderLogger,
        total_ms: u64,
        cancel: &CancelHandle,
        on_progress: &mut dyn FnMut(RenderProgress),
    ) -> RenderResult<()> {
        let total_secs = total_ms as f64 / 1000.0;
        let started = Instant::now();
        logger.progress(0, 0);

        loop {
            if cancel.is_cancelled() {
                abort(process);
                return Err(RenderError::Cancelled);
            }

            let line = match process.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    abort(process);
                    return Err(RenderError::io("reading transcoder output", e));
                }
            };
            logger.output_line(&line);

            let Some(elapsed) = parse_time_token(&line) else {
                continue;
            };
            if let Some(seconds_remaining) = estimate_remaining(elapsed, total_secs, started.elapsed()) {
                let percent = percent_complete(elapsed, total_secs);
                logger.progress(percent, seconds_remaining);
                on_progress(RenderProgress {
                    percent,
                    seconds_remaining,
                });
            }
        }

        if cancel.is_cancelled() {
            abort(process);
            return Err(RenderError::Cancelled);
        }
        Ok(())
    }

    /// Check the exit status and move the partial file into the cache.
    fn finish(
        &self,
        process: &mut dyn TranscodeProcess,
        logger: &RenderLogger,
        partial: &Path,
        output: &Path,
    ) -> RenderResult<RenderOutput> {
        let tool = self.toolkit.transcoder_name();
        let exit_code = process
            .wait()
            .map_err(|e| RenderError::io(format!("waiting for {}", tool), e))?;

        if exit_code != Some(0) {
            let tail = logger.tail();
            let excerpt = tail
                .iter()
                .skip(tail.len().saturating_sub(FAILURE_EXCERPT_LINES))
                .cloned()
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(RenderError::transcode_failed(tool, exit_code, excerpt));
        }

        if !partial.is_file() {
            return Err(RenderError::transcode_failed(
                tool,
                exit_code,
                "no output file was produced",
            ));
        }

        if output.exists() {
            // Another render of the same asset got there first
            remove_partial(partial);
            logger.success(&format!("Render already cached: {}", output.display()));
            return Ok(RenderOutput::CacheHit(output.to_path_buf()));
        }

        fs::rename(partial, output).map_err(|e| RenderError::io("moving render into cache", e))?;
        logger.success(&format!("Render complete: {}", output.display()));
        Ok(RenderOutput::Rendered(output.to_path_buf()))
    }

    fn open_logger(&self, job: &RenderJob) -> RenderLogger {
        let name = format!("render_{}", job.job_name());
        let Some(dir) = &self.log_dir else {
            return RenderLogger::detached(name, self.log_config.clone(), None);
        };
        match RenderLogger::new(&name, dir, self.log_config.clone(), None) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::warn!("Could not create render log in {}: {}", dir.display(), e);
                RenderLogger::detached(name, self.log_config.clone(), None)
            }
        }
    }

    /// Render `job` on a new background thread, reporting through `tx`.
    pub fn spawn(
        self: &Arc<Self>,
        job: RenderJob,
        cancel: CancelHandle,
        tx: Sender<RenderMessage>,
    ) -> std::io::Result<JoinHandle<()>> {
        let worker = Arc::clone(self);
        thread::Builder::new()
            .name("render-worker".to_string())
            .spawn(move || {
                let track = job.track;
                let progress_tx = tx.clone();
                let result = worker.run(&job, &cancel, &mut |progress| {
                    let _ = progress_tx.send(RenderMessage::Progress { track, progress });
                });

                match &result {
                    Ok(output) => tracing::debug!("Render {} finished: {:?}", track, output),
                    Err(e) if e.is_cancelled() => tracing::info!("Render {} cancelled", track),
                    Err(e) => tracing::warn!("Render {} failed: {}", track, e),
                }
                // The coordinator may already be gone during shutdown
                let _ = tx.send(RenderMessage::Done { track, result });
            })
    }
}

/// Hidden, unique sibling of `output` that keeps its extension so the
/// transcoder picks the same muxer.
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = format!(".{}.{}-{}.part", stem, std::process::id(), n);
    if let Some(ext) = output.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    output.with_file_name(name)
}

fn abort(process: &mut dyn TranscodeProcess) {
    if let Err(e) = process.terminate() {
        tracing::warn!("Failed to stop transcoder: {}", e);
    }
    if let Err(e) = process.wait() {
        tracing::warn!("Failed to reap transcoder: {}", e);
    }
}

fn remove_partial(partial: &Path) {
    if partial.exists() {
        if let Err(e) = fs::remove_file(partial) {
            tracing::warn!("Failed to remove partial render {}: {}", partial.display(), e);
        }
    }
}
