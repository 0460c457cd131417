//! Cached asset path resolution.
//!
//! Shifted renders are content-addressed by source stem and control values,
//! so the same request always maps to the same file in the render cache.

use std::path::{Path, PathBuf};

use crate::models::{ContainerKind, ShiftControls, ShiftedAsset, Track};

/// Computes where shifted renders live in the render cache.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    cache_dir: PathBuf,
    lossless_extension: String,
}

impl AssetResolver {
    pub fn new(cache_dir: impl Into<PathBuf>, lossless_extension: impl Into<String>) -> Self {
        let lossless_extension = lossless_extension.into();
        Self {
            cache_dir: cache_dir.into(),
            lossless_extension: lossless_extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Expected path of the shifted asset for `track`'s current controls.
    ///
    /// `None` when both controls are zero. Pure path computation.
    pub fn resolve(&self, track: &Track) -> Option<PathBuf> {
        self.resolve_for(track.source_path(), track.container(), track.controls())
    }

    /// Expected path for an arbitrary source and control pair.
    pub fn resolve_for(
        &self,
        source: &Path,
        container: ContainerKind,
        controls: ShiftControls,
    ) -> Option<PathBuf> {
        let suffix = controls.suffix()?;
        let stem = source.file_stem()?.to_string_lossy();
        let ext = self.output_extension(source, container);
        Some(self.cache_dir.join(format!("{}_{}.{}", stem, suffix, ext)))
    }

    /// Extension of renders for this source: the original one for remuxable
    /// containers, the lossless audio one otherwise.
    pub fn output_extension(&self, source: &Path, container: ContainerKind) -> String {
        if container.is_remuxable() {
            if let Some(ext) = source.extension() {
                return ext.to_string_lossy().into_owned();
            }
        }
        self.lossless_extension.clone()
    }

    /// Resolved path, only if the file already exists.
    pub fn cached(&self, track: &Track) -> Option<PathBuf> {
        self.resolve(track).filter(|p| p.is_file())
    }

    /// Asset to attach to `track` if its render is already cached.
    pub fn cached_asset(&self, track: &Track) -> ShiftedAsset {
        match self.cached(track) {
            Some(path) => ShiftedAsset::for_controls(&track.controls(), path),
            None => ShiftedAsset::None,
        }
    }
}
