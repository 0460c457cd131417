//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Folders and files the player reads and writes.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Transcoder and render cache settings.
    #[serde(default)]
    pub render: RenderSettings,

    /// Dual-stream playback timing.
    #[serde(default)]
    pub playback: PlaybackSettings,

    /// Ambient loop shown while the queue is empty.
    #[serde(default)]
    pub idle: IdleSettings,
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Render cache for shifted assets.
    #[serde(default = "default_temp_folder")]
    pub temp_folder: String,

    /// Append-only play history.
    #[serde(default = "default_history_file")]
    pub history_file: String,

    /// Saved track lists.
    #[serde(default = "default_lists_folder")]
    pub lists_folder: String,

    /// Idle loop clips.
    #[serde(default = "default_idles_folder")]
    pub idles_folder: String,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_temp_folder() -> String {
    "temp".to_string()
}

fn default_history_file() -> String {
    "history.log".to_string()
}

fn default_lists_folder() -> String {
    "Lists".to_string()
}

fn default_idles_folder() -> String {
    "Idles".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            temp_folder: default_temp_folder(),
            history_file: default_history_file(),
            lists_folder: default_lists_folder(),
            idles_folder: default_idles_folder(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level for application logs.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact render logs (progress filtered, transcoder output tail only).
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of transcoder lines kept for error reports.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Write a log file per render job.
    #[serde(default = "default_true")]
    pub render_logs: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            render_logs: true,
        }
    }
}

/// Transcoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Transcoder binary (name on PATH or absolute path).
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    /// ffprobe binary (name on PATH or absolute path).
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,

    /// Extension for audio-only renders of non-remuxable containers.
    #[serde(default = "default_lossless_extension")]
    pub lossless_extension: String,

    /// Codec for re-encoded audio.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Codec for re-encoded video (only used when timestamps are rescaled).
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Purge the render cache at startup.
    #[serde(default = "default_true")]
    pub auto_delete_temp: bool,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_lossless_extension() -> String {
    "flac".to_string()
}

fn default_audio_codec() -> String {
    "flac".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            lossless_extension: default_lossless_extension(),
            audio_codec: default_audio_codec(),
            video_codec: default_video_codec(),
            auto_delete_temp: true,
        }
    }
}

/// Playback timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Drift correction interval.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Drift above this is corrected by snapping.
    #[serde(default = "default_drift_tolerance_ms")]
    pub drift_tolerance_ms: u64,

    /// Progress/status refresh interval.
    #[serde(default = "default_ui_refresh_ms")]
    pub ui_refresh_ms: u64,

    /// Window in which repeated playback errors are not shown again.
    #[serde(default = "default_error_cooldown_ms")]
    pub error_cooldown_ms: u64,

    /// Step for relative seeks.
    #[serde(default = "default_seek_step_ms")]
    pub seek_step_ms: u64,
}

fn default_sync_interval_ms() -> u64 {
    100
}

fn default_drift_tolerance_ms() -> u64 {
    300
}

fn default_ui_refresh_ms() -> u64 {
    500
}

fn default_error_cooldown_ms() -> u64 {
    1000
}

fn default_seek_step_ms() -> u64 {
    5000
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval_ms(),
            drift_tolerance_ms: default_drift_tolerance_ms(),
            ui_refresh_ms: default_ui_refresh_ms(),
            error_cooldown_ms: default_error_cooldown_ms(),
            seek_step_ms: default_seek_step_ms(),
        }
    }
}

impl PlaybackSettings {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    pub fn ui_refresh(&self) -> Duration {
        Duration::from_millis(self.ui_refresh_ms.max(1))
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }
}

/// Idle loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleSettings {
    /// Clip (in the idles folder) shown first.
    #[serde(default = "default_idle")]
    pub default_idle: String,

    /// Seconds between random clip changes; 0 disables rotation.
    #[serde(default = "default_change_interval_secs")]
    pub change_interval_secs: u64,
}

fn default_idle() -> String {
    "wire.mp4".to_string()
}

fn default_change_interval_secs() -> u64 {
    30
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            default_idle: default_idle(),
            change_interval_secs: default_change_interval_secs(),
        }
    }
}

impl IdleSettings {
    /// Rotation interval, `None` when disabled.
    pub fn change_interval(&self) -> Option<Duration> {
        if self.change_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.change_interval_secs))
        }
    }
}

/// Config sections that can be updated independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Render,
    Playback,
    Idle,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Render,
        ConfigSection::Playback,
        ConfigSection::Idle,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Render => "render",
            ConfigSection::Playback => "playback",
            ConfigSection::Idle => "idle",
        }
    }

    /// Comment written above the section in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "# Folders and files",
            ConfigSection::Logging => "# Logging configuration",
            ConfigSection::Render => "# Key/tempo rendering through ffmpeg",
            ConfigSection::Playback => "# Dual-stream playback timing",
            ConfigSection::Idle => "# Idle loop shown while the queue is empty",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[render]"));
        assert!(toml.contains("temp_folder"));
        assert!(toml.contains("drift_tolerance_ms = 300"));
    }

    #[test]
    fn settings_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.paths.temp_folder, settings.paths.temp_folder);
        assert_eq!(parsed.logging.level, settings.logging.level);
        assert_eq!(parsed.idle.default_idle, "wire.mp4");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: Settings = toml::from_str("[playback]\nseek_step_ms = 10000\n").unwrap();
        assert_eq!(parsed.playback.seek_step_ms, 10000);
        assert_eq!(parsed.playback.sync_interval_ms, 100);
        assert_eq!(parsed.render.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn zero_interval_disables_rotation() {
        let idle = IdleSettings {
            change_interval_secs: 0,
            ..IdleSettings::default()
        };
        assert!(idle.change_interval().is_none());
        assert_eq!(
            IdleSettings::default().change_interval(),
            Some(Duration::from_secs(30))
        );
    }
}
