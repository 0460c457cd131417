//! KP Core - Backend logic for the karaoke player
//!
//! This crate contains the render pipeline (pitch/tempo shifting through an
//! external transcoder), the play queue, and the dual-stream playback
//! synchronizer, with zero UI dependencies. It can be driven by a GUI
//! front-end or by the bundled CLI.

pub mod config;
pub mod history;
pub mod logging;
pub mod media;
pub mod models;
pub mod playback;
pub mod queue;
pub mod render;
pub mod session;
pub mod silence;

#[cfg(test)]
mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
