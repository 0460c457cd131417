//! Transcoder progress parsing.
//!
//! ffmpeg reports progress on stderr as `... time=HH:MM:SS.xx ...`, with
//! lines terminated by carriage returns rather than newlines.

use std::io::{self, BufRead};
use std::time::Duration;

/// Extract the elapsed media time (seconds) from a progress line.
///
/// Returns `None` when the line has no `time=` token or it is `N/A`.
pub fn parse_time_token(line: &str) -> Option<f64> {
    let start = line.rfind("time=")? + "time=".len();
    let token = line[start..].split_whitespace().next()?;

    let mut parts = token.split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || h < 0.0 || m < 0.0 || s < 0.0 {
        return None;
    }
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Extrapolate remaining wall-clock seconds.
///
/// `fraction = media_elapsed / total`; the job is assumed to keep its
/// current average speed. Returns `None` until any progress is made.
pub fn estimate_remaining(media_elapsed_secs: f64, total_secs: f64, real_elapsed: Duration) -> Option<u64> {
    if total_secs <= 0.0 {
        return None;
    }
    let fraction = media_elapsed_secs / total_secs;
    if fraction <= 0.0 {
        return None;
    }
    let real = real_elapsed.as_secs_f64();
    let estimated_total = real / fraction;
    Some((estimated_total - real).max(0.0) as u64)
}

/// Percent complete, clamped to 0..=100.
pub fn percent_complete(media_elapsed_secs: f64, total_secs: f64) -> u32 {
    if total_secs <= 0.0 {
        return 0;
    }
    ((media_elapsed_secs / total_secs) * 100.0).clamp(0.0, 100.0) as u32
}

/// Read one diagnostic line, treating `\r` and `\n` both as terminators.
///
/// Empty segments are skipped. Returns `Ok(None)` at end of stream.
pub fn read_diagnostic_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(finish(line));
        }

        match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(pos) => {
                line.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                if !line.is_empty() {
                    return Ok(finish(line));
                }
            }
            None => {
                let len = available.len();
                line.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

fn finish(line: Vec<u8>) -> Option<String> {
    if line.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}
