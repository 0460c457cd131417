//! Data models for the karaoke player.
//!
//! This module contains the core data structures shared by the render
//! pipeline, the play queue and the playback synchronizer:
//! - Enums for container kinds and render state
//! - Shift controls (key/tempo) and the rendered asset they produced
//! - Tracks, the unit the queue holds and the synchronizer loads
//! - Filename metadata helpers

mod controls;
mod enums;
mod metadata;
mod track;

pub use controls::{ShiftControls, ShiftKind, ShiftedAsset, MAX_TEMPO_STEPS, MIN_TEMPO_STEPS};
pub use enums::{ContainerKind, RenderState, SUPPORTED_EXTENSIONS};
pub use metadata::{effective_duration_ms, format_mmss, parse_artist_title};
pub use track::{SilenceMarkers, Track, TrackId};
