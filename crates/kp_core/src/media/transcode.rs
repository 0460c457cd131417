//! Transcoder command planning.
//!
//! Builds the minimal ffmpeg filter graph for a key/tempo change:
//! - Pitch stage (`rubberband`) only when the pitch factor differs from 1
//! - Tempo stage (`atempo`) only when the tempo factor differs from 1
//! - Video timestamps rescaled (`setpts`) only for remuxable containers
//!   with a tempo change; video is otherwise stream-copied

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::RenderSettings;
use crate::models::ContainerKind;

/// Factors closer to 1 than this are treated as no change.
const FACTOR_EPSILON: f64 = 1e-9;

fn is_unity(factor: f64) -> bool {
    (factor - 1.0).abs() < FACTOR_EPSILON
}

/// Codec choices for re-encoded streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSettings {
    pub audio_codec: String,
    pub video_codec: String,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            audio_codec: "flac".to_string(),
            video_codec: "libx264".to_string(),
        }
    }
}

impl From<&RenderSettings> for CodecSettings {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            audio_codec: settings.audio_codec.clone(),
            video_codec: settings.video_codec.clone(),
        }
    }
}

/// Shape of the ffmpeg invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    /// Audio extracted and filtered, video dropped.
    AudioOnly,
    /// Audio filtered, video stream copied.
    RemuxCopyVideo,
    /// Audio filtered, video timestamps rescaled and re-encoded.
    RemuxReencodeVideo,
}

/// A planned transcode of one input into one output.
#[derive(Debug, Clone)]
pub struct TranscodePlan {
    input: PathBuf,
    output: PathBuf,
    audio_filters: Vec<String>,
    video_filter: Option<String>,
    mode: TranscodeMode,
    codecs: CodecSettings,
}

impl TranscodePlan {
    /// Plan a pitch/tempo transcode.
    ///
    /// Returns `None` when both factors are 1 (nothing to do).
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        container: ContainerKind,
        pitch_factor: f64,
        tempo_factor: f64,
        codecs: CodecSettings,
    ) -> Option<Self> {
        let mut audio_filters = Vec::with_capacity(2);
        if !is_unity(pitch_factor) {
            audio_filters.push(format!("rubberband=pitch={}", pitch_factor));
        }
        if !is_unity(tempo_factor) {
            audio_filters.push(format!("atempo={}", tempo_factor));
        }
        if audio_filters.is_empty() {
            return None;
        }

        let (mode, video_filter) = if !container.is_remuxable() {
            (TranscodeMode::AudioOnly, None)
        } else if is_unity(tempo_factor) {
            (TranscodeMode::RemuxCopyVideo, None)
        } else {
            (
                TranscodeMode::RemuxReencodeVideo,
                Some(format!("setpts=PTS/{}", tempo_factor)),
            )
        };

        Some(Self {
            input: input.into(),
            output: output.into(),
            audio_filters,
            video_filter,
            mode,
            codecs,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn mode(&self) -> TranscodeMode {
        self.mode
    }

    /// Audio filter chain, stages joined with commas.
    pub fn audio_chain(&self) -> String {
        self.audio_filters.join(",")
    }

    pub fn video_filter(&self) -> Option<&str> {
        self.video_filter.as_deref()
    }

    pub fn has_pitch_stage(&self) -> bool {
        self.audio_filters.iter().any(|f| f.starts_with("rubberband="))
    }

    pub fn has_tempo_stage(&self) -> bool {
        self.audio_filters.iter().any(|f| f.starts_with("atempo="))
    }

    /// Whether the video stream is re-encoded rather than copied.
    pub fn reencodes_video(&self) -> bool {
        self.mode == TranscodeMode::RemuxReencodeVideo
    }

    /// Same plan writing to a different output path.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// ffmpeg arguments (program name excluded).
    pub fn args(&self) -> Vec<OsString> {
        let audio_chain = self.audio_chain();

        let filters: Vec<String> = match self.mode {
            TranscodeMode::AudioOnly => vec!["-filter:a".into(), audio_chain, "-vn".into()],
            TranscodeMode::RemuxCopyVideo => vec![
                "-filter:a".into(),
                audio_chain,
                "-map".into(),
                "0:v".into(),
                "-map".into(),
                "0:a".into(),
                "-c:v".into(),
                "copy".into(),
            ],
            TranscodeMode::RemuxReencodeVideo => {
                let video = self.video_filter.as_deref().unwrap_or("null");
                vec![
                    "-filter_complex".into(),
                    format!("[0:a]{}[a];[0:v]{}[v]", audio_chain, video),
                    "-map".into(),
                    "[v]".into(),
                    "-map".into(),
                    "[a]".into(),
                    "-c:v".into(),
                    self.codecs.video_codec.clone(),
                ]
            }
        };

        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), self.input.clone().into()];
        args.extend(filters.into_iter().map(OsString::from));
        args.push("-c:a".into());
        args.push(self.codecs.audio_codec.clone().into());
        args.push(self.output.clone().into());
        args
    }

    /// Human-readable command line for logs.
    pub fn display_command(&self, program: &str) -> String {
        let mut parts = vec![program.to_string()];
        for arg in self.args() {
            let arg = arg.to_string_lossy().into_owned();
            if arg.contains(' ') || arg.contains(';') {
                parts.push(format!("\"{}\"", arg));
            } else {
                parts.push(arg);
            }
        }
        parts.join(" ")
    }
}
