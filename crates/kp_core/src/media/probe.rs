//! Media duration probing through ffprobe.

use std::path::Path;
use std::process::{Command, Stdio};

/// Duration of `media` in milliseconds.
///
/// Returns `None` when the file is missing, ffprobe fails, or its output
/// is not a positive number of seconds.
pub fn probe_duration_ms(ffprobe: &Path, media: &Path) -> Option<u64> {
    if !media.exists() {
        tracing::debug!("Probe skipped, file missing: {}", media.display());
        return None;
    }

    let mut cmd = Command::new(ffprobe);
    cmd.arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(media)
        .stdin(Stdio::null());

    tracing::debug!("Running ffprobe: {:?}", cmd);

    let output = match cmd.output() {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Failed to run ffprobe: {}", e);
            return None;
        }
    };

    if !output.status.success() {
        tracing::warn!(
            "ffprobe failed for {} (exit {:?})",
            media.display(),
            output.status.code()
        );
        return None;
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe's bare `format=duration` output (seconds) into ms.
pub fn parse_probe_output(stdout: &str) -> Option<u64> {
    let secs: f64 = stdout.lines().next()?.trim().parse().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Some((secs * 1000.0) as u64)
}
