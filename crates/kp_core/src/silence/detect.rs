//! RMS-based silence boundaries.

use crate::models::SilenceMarkers;

/// Sample rate PCM is decoded at for scanning.
pub const SCAN_SAMPLE_RATE: u32 = 22_050;

/// Samples per RMS frame.
pub const FRAME_LENGTH: usize = 2048;

/// Samples between frame starts.
pub const HOP_LENGTH: usize = 1024;

/// Frames quieter than this fraction of the loudest frame are silence.
pub const THRESHOLD_RATIO: f32 = 0.01;

/// RMS energy of each frame. The last frames are zero-padded.
fn frame_rms(samples: &[f32]) -> Vec<f32> {
    (0..samples.len())
        .step_by(HOP_LENGTH)
        .map(|start| {
            let end = (start + FRAME_LENGTH).min(samples.len());
            let energy: f32 = samples[start..end].iter().map(|s| s * s).sum();
            (energy / FRAME_LENGTH as f32).sqrt()
        })
        .collect()
}

/// Locate the first and last audible frames of `samples`.
///
/// Returns `None` when every frame is silent (including empty input).
/// `outro_ms` is the end of the last audible hop.
pub fn find_bounds(samples: &[f32], sample_rate: u32) -> Option<SilenceMarkers> {
    if sample_rate == 0 {
        return None;
    }
    let rms = frame_rms(samples);
    let peak = rms.iter().copied().fold(0.0_f32, f32::max);
    if peak <= 0.0 {
        return None;
    }

    let threshold = peak * THRESHOLD_RATIO;
    let first = rms.iter().position(|&v| v > threshold)?;
    let last = rms.iter().rposition(|&v| v > threshold)?;

    let ms_per_frame = 1000.0 * HOP_LENGTH as f64 / sample_rate as f64;
    Some(SilenceMarkers {
        intro_ms: (first as f64 * ms_per_frame) as u64,
        outro_ms: ((last + 1) as f64 * ms_per_frame) as u64,
    })
}
