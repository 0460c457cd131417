//! Configuration management for the karaoke player.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use kp_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/settings.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Render cache: {}", config.settings().paths.temp_folder);
//!
//! config.settings_mut().playback.seek_step_ms = 10_000;
//! config.update_section(ConfigSection::Playback).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, IdleSettings, LoggingSettings, PathSettings, PlaybackSettings, RenderSettings,
    Settings,
};
