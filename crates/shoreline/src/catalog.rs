//! Recursive discovery of input rasters.

use std::path::{Path, PathBuf};

use shoreline_common::{utils, QUALITY_MASK_MARKER, RASTER_EXTENSION};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::types::Raster;

/// Rasters found under a root directory, minus quality-mask companions
#[derive(Debug, Clone)]
pub struct RasterCatalog {
    root: PathBuf,
    extension: String,
    mask_marker: String,
}

impl RasterCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: RASTER_EXTENSION.to_string(),
            mask_marker: QUALITY_MASK_MARKER.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_mask_marker(mut self, marker: impl Into<String>) -> Self {
        self.mask_marker = marker.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree lazily, yielding eligible rasters as they are found.
    ///
    /// Entries that cannot be read are skipped with a warning.
    pub fn scan(&self) -> impl Iterator<Item = Raster> + '_ {
        WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.has_extension(entry.path()))
            .map(|entry| Raster::new(entry.into_path()))
            .filter(|raster| {
                let excluded = utils::is_quality_mask(raster.base_name(), &self.mask_marker);
                if excluded {
                    debug!("Excluding quality mask {}", raster.path().display());
                }
                !excluded
            })
    }

    /// Every eligible raster, sorted by path.
    ///
    /// Fails with [`PipelineError::EmptyCatalog`] when nothing qualifies.
    pub fn discover(&self) -> Result<Vec<Raster>> {
        let mut rasters: Vec<Raster> = self.scan().collect();
        if rasters.is_empty() {
            return Err(PipelineError::EmptyCatalog {
                root: self.root.clone(),
            });
        }
        rasters.sort();
        Ok(rasters)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    fn names(rasters: &[Raster]) -> Vec<&str> {
        rasters.iter().map(|r| r.base_name()).collect()
    }

    #[test]
    fn test_excludes_quality_masks() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "scene_a.tif");
        touch(dir.path(), "scene_a_udm.tif");
        touch(dir.path(), "scene_b_udm2.tif");
        touch(dir.path(), "scene_b.tif");

        let rasters = RasterCatalog::new(dir.path()).discover().unwrap();
        assert_eq!(names(&rasters), ["scene_a", "scene_b"]);
    }

    #[test]
    fn test_recurses_and_sorts_by_path() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "z/late.tif");
        touch(dir.path(), "a/nested/deep.tif");
        touch(dir.path(), "m.tif");

        let rasters = RasterCatalog::new(dir.path()).discover().unwrap();
        assert_eq!(names(&rasters), ["deep", "m", "late"]);
        assert!(rasters.windows(2).all(|w| w[0].path() < w[1].path()));
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "scene_UDM.tif");

        let rasters = RasterCatalog::new(dir.path()).discover().unwrap();
        assert_eq!(names(&rasters), ["scene_UDM"]);
    }

    #[test]
    fn test_marker_checked_on_base_name_only() {
        let dir = TempDir::new().unwrap();
        // The marker in a folder name or after the first dot does not exclude
        touch(dir.path(), "udm_folder/scene.tif");
        touch(dir.path(), "scene2.udm.tif");

        let rasters = RasterCatalog::new(dir.path()).discover().unwrap();
        assert_eq!(names(&rasters), ["scene2", "scene"]);
    }

    #[test]
    fn test_ignores_other_extensions_and_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "scene.tif.aux.xml");
        touch(dir.path(), "scene.TIF");
        touch(dir.path(), "notes.txt");
        fs::create_dir_all(dir.path().join("folder.tif")).unwrap();
        touch(dir.path(), "scene.tif");

        let rasters = RasterCatalog::new(dir.path()).discover().unwrap();
        assert_eq!(rasters.len(), 1);
        assert_eq!(rasters[0].path(), dir.path().join("scene.tif"));
    }

    #[test]
    fn test_empty_catalog() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "only_udm.tif");

        let err = RasterCatalog::new(dir.path()).discover().unwrap_err();
        assert!(matches!(err, PipelineError::EmptyCatalog { .. }));
    }

    #[test]
    fn test_scan_is_lazy() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.tif");
        touch(dir.path(), "b.tif");

        let catalog = RasterCatalog::new(dir.path());
        assert_eq!(catalog.scan().take(1).count(), 1);
    }
}
