//! Key/tempo controls and the rendered asset variant they produce.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Speed change per tempo step (5%).
pub const TEMPO_STEP: f64 = 0.05;

/// Slowest supported tempo: half speed.
pub const MIN_TEMPO_STEPS: i32 = -10;

/// Fastest supported tempo: double speed.
pub const MAX_TEMPO_STEPS: i32 = 20;

/// Signed key and tempo adjustments applied to a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShiftControls {
    /// Transposition in semitones.
    pub semitones: i32,
    /// Tempo steps, each one ±5% speed.
    pub tempo_steps: i32,
}

impl ShiftControls {
    pub fn new(semitones: i32, tempo_steps: i32) -> Self {
        Self {
            semitones,
            tempo_steps,
        }
    }

    /// Copy with the tempo steps limited to
    /// `MIN_TEMPO_STEPS..=MAX_TEMPO_STEPS`, the range `atempo` accepts.
    pub fn clamped(&self) -> Self {
        Self {
            semitones: self.semitones,
            tempo_steps: self.tempo_steps.clamp(MIN_TEMPO_STEPS, MAX_TEMPO_STEPS),
        }
    }

    /// Both controls at zero.
    pub fn is_default(&self) -> bool {
        self.semitones == 0 && self.tempo_steps == 0
    }

    /// Frequency ratio, `2^(semitones/12)`.
    pub fn pitch_factor(&self) -> f64 {
        if self.semitones == 0 {
            return 1.0;
        }
        2f64.powf(self.semitones as f64 / 12.0)
    }

    /// Playback speed ratio, `1 + steps * 0.05`.
    pub fn tempo_factor(&self) -> f64 {
        if self.tempo_steps == 0 {
            return 1.0;
        }
        1.0 + self.tempo_steps as f64 * TEMPO_STEP
    }

    /// Tempo change expressed in percent.
    pub fn tempo_percent(&self) -> i32 {
        self.tempo_steps * 5
    }

    /// Which rendered variant these controls call for, if any.
    pub fn kind(&self) -> Option<ShiftKind> {
        match (self.semitones != 0, self.tempo_steps != 0) {
            (false, false) => None,
            (true, false) => Some(ShiftKind::PitchOnly),
            (false, true) => Some(ShiftKind::TempoOnly),
            (true, true) => Some(ShiftKind::Combined),
        }
    }

    /// Filename suffix encoding the non-zero controls, key first.
    ///
    /// `Key2`, `Tempo-10`, `Key2_Tempo-10`; `None` when both are zero.
    pub fn suffix(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(2);
        if self.semitones != 0 {
            parts.push(format!("Key{}", self.semitones));
        }
        if self.tempo_steps != 0 {
            parts.push(format!("Tempo{}", self.tempo_percent()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("_"))
        }
    }

    /// Display string for the key control: `+2`, `-1`, `0`.
    pub fn key_label(&self) -> String {
        if self.semitones > 0 {
            format!("+{}", self.semitones)
        } else {
            self.semitones.to_string()
        }
    }

    /// Display string for the tempo control: `+10%`, `-5%`, `0%`.
    pub fn tempo_label(&self) -> String {
        let percent = self.tempo_percent();
        if percent > 0 {
            format!("+{}%", percent)
        } else {
            format!("{}%", percent)
        }
    }
}

/// Kind of rendered variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftKind {
    PitchOnly,
    TempoOnly,
    Combined,
}

/// Rendered asset attached to a track.
///
/// Recomputed whenever the track's controls change, so it can never
/// describe a different key/tempo than the one the track carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShiftedAsset {
    #[default]
    None,
    PitchOnly(PathBuf),
    TempoOnly(PathBuf),
    Combined(PathBuf),
}

impl ShiftedAsset {
    /// Wrap a rendered path in the variant matching `controls`.
    pub fn for_controls(controls: &ShiftControls, path: PathBuf) -> Self {
        match controls.kind() {
            None => ShiftedAsset::None,
            Some(ShiftKind::PitchOnly) => ShiftedAsset::PitchOnly(path),
            Some(ShiftKind::TempoOnly) => ShiftedAsset::TempoOnly(path),
            Some(ShiftKind::Combined) => ShiftedAsset::Combined(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ShiftedAsset::None => None,
            ShiftedAsset::PitchOnly(p) | ShiftedAsset::TempoOnly(p) | ShiftedAsset::Combined(p) => {
                Some(p)
            }
        }
    }

    pub fn kind(&self) -> Option<ShiftKind> {
        match self {
            ShiftedAsset::None => None,
            ShiftedAsset::PitchOnly(_) => Some(ShiftKind::PitchOnly),
            ShiftedAsset::TempoOnly(_) => Some(ShiftKind::TempoOnly),
            ShiftedAsset::Combined(_) => Some(ShiftKind::Combined),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ShiftedAsset::None)
    }
}
