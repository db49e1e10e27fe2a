//! Parameter sets handed to the external engines.
//!
//! Every field that the toolkit would otherwise default is spelled out here,
//! so that two runs over the same inputs issue identical calls.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use shoreline_common::{
    BackgroundValue, ColormapMode, Distance, MosaicMethod, PixelType, SpatialReference,
    RASTER_EXTENSION,
};

use crate::sources::{DirectorySink, FileSink, FileSource};

/// One shoreline-detection call on one input raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub input: PathBuf,
    pub output_location: PathBuf,
    /// Output name without extension (`shore_<base_name>`)
    pub output_file: String,
    pub green_band: u8,
    pub nir_band: u8,
}

impl DetectionRequest {
    pub fn source(&self) -> FileSource {
        FileSource::new(&self.input)
    }

    pub fn sink(&self) -> DirectorySink {
        DirectorySink::new(&self.output_location, &self.output_file)
    }

    /// Raster written by a successful call
    pub fn output_path(&self) -> PathBuf {
        self.output_location
            .join(format!("{}.{}", self.output_file, RASTER_EXTENSION))
    }
}

/// Merge of the ordered shoreline rasters into one new raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicRequest {
    /// Inputs in priority order; the first listed wins ties
    pub inputs: Vec<PathBuf>,
    pub output_location: PathBuf,
    /// Output name including extension (`code_mosaic<run>.tif`)
    pub dataset_name: String,
    pub spatial_reference: SpatialReference,
    pub pixel_type: PixelType,
    pub band_count: u8,
    pub method: MosaicMethod,
    pub colormap_mode: ColormapMode,
}

impl MosaicRequest {
    pub fn sources(&self) -> Vec<FileSource> {
        self.inputs.iter().map(FileSource::new).collect()
    }

    pub fn sink(&self) -> DirectorySink {
        DirectorySink::new(&self.output_location, &self.dataset_name)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_location.join(&self.dataset_name)
    }
}

/// Raster-to-polyline conversion of the merged raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRequest {
    pub input: PathBuf,
    pub output_features: PathBuf,
    pub background: BackgroundValue,
    /// Minimum traced dangle length in map units; `0` traces everything
    pub minimum_dangle_length: f64,
    pub simplify: bool,
    pub raster_field: String,
}

impl TraceRequest {
    pub fn source(&self) -> FileSource {
        FileSource::new(&self.input)
    }

    pub fn sink(&self) -> FileSink {
        FileSink::new(&self.output_features)
    }
}

/// One in-place dangle trimming pass over a line dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimLineRequest {
    pub features: PathBuf,
    pub dangle_length: Distance,
    pub delete_shorts: bool,
}

impl TrimLineRequest {
    pub fn source(&self) -> FileSource {
        FileSource::new(&self.features)
    }
}

/// Feature counts reported by a trimming pass, when the engine exposes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrimReport {
    pub removed: Option<usize>,
    pub remaining: Option<usize>,
}

impl TrimReport {
    pub fn counted(removed: usize, remaining: usize) -> Self {
        Self {
            removed: Some(removed),
            remaining: Some(remaining),
        }
    }
}
