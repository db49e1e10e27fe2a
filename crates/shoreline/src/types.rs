use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engines::TrimReport;
use shoreline_common::{
    utils, BackgroundValue, ColormapMode, Distance, LinearUnit, MosaicMethod, PixelType,
    RunContext, RunLayout, SpatialReference,
};

use crate::blocking::CallError;
use crate::error::{PipelineError, Result};

/// A cataloged input raster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Raster {
    path: PathBuf,
    base_name: String,
}

impl Raster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let base_name = utils::raster_base_name(&path.to_string_lossy()).to_string();
        Self { path, base_name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }
}

/// Result of running shoreline detection on one raster
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success { raster: Raster, output: PathBuf },
    Failure { raster_name: String, cause: CallError },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One outcome per cataloged raster, in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResultSet {
    outcomes: Vec<ExtractionOutcome>,
}

impl ExtractionResultSet {
    pub fn new(outcomes: Vec<ExtractionOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[ExtractionOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Shoreline rasters of the successful extractions, in catalog order.
    ///
    /// This order is the tie-break priority handed to the mosaic engine.
    pub fn successful_outputs(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ExtractionOutcome::Success { output, .. } => Some(output.clone()),
                ExtractionOutcome::Failure { .. } => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &CallError)> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            ExtractionOutcome::Failure { raster_name, cause } => Some((raster_name.as_str(), cause)),
            ExtractionOutcome::Success { .. } => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }
}

/// The merged raster of one run
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicRaster {
    pub path: PathBuf,
    pub method: MosaicMethod,
    pub colormap_mode: ColormapMode,
    pub pixel_type: PixelType,
    pub band_count: u8,
    pub spatial_reference: SpatialReference,
    pub input_count: usize,
}

/// Line features traced from the mosaic
#[derive(Debug, Clone, PartialEq)]
pub struct ShorelineVectorDataset {
    pub path: PathBuf,
    pub background: BackgroundValue,
    pub minimum_segment_length: f64,
    pub simplify: bool,
    pub raster_field: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DangleTrimPass {
    pub threshold: Distance,
    pub delete_short: bool,
}

impl DangleTrimPass {
    pub fn delete_short(threshold: Distance) -> Self {
        Self {
            threshold,
            delete_short: true,
        }
    }
}

/// Ordered trimming passes with strictly increasing thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct TrimSchedule {
    passes: Vec<DangleTrimPass>,
}

impl TrimSchedule {
    pub fn new(passes: Vec<DangleTrimPass>) -> Result<Self> {
        if passes.is_empty() {
            return Err(PipelineError::Configuration(
                "trim schedule needs at least one pass".to_string(),
            ));
        }
        for pair in passes.windows(2) {
            let (previous, next) = (pair[0].threshold, pair[1].threshold);
            if next.to_meters() <= previous.to_meters() {
                return Err(PipelineError::Configuration(format!(
                    "trim thresholds must strictly increase, got {} after {}",
                    next, previous
                )));
            }
        }
        Ok(Self { passes })
    }

    /// `DELETE_SHORT` passes at each of the given distances
    pub fn from_thresholds(thresholds: &[Distance]) -> Result<Self> {
        Self::new(thresholds.iter().copied().map(DangleTrimPass::delete_short).collect())
    }

    pub fn passes(&self) -> &[DangleTrimPass] {
        &self.passes
    }
}

impl Default for TrimSchedule {
    /// 3, 6 and 9 metres
    fn default() -> Self {
        let pass = |value| {
            DangleTrimPass::delete_short(Distance {
                value,
                unit: LinearUnit::Meters,
            })
        };
        Self {
            passes: vec![pass(3.0), pass(6.0), pass(9.0)],
        }
    }
}

/// How far the vector dataset has been cleaned
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TrimState {
    #[default]
    Untrimmed,
    TrimmedAt(Distance),
}

impl fmt::Display for TrimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untrimmed => write!(f, "untrimmed"),
            Self::TrimmedAt(threshold) => write!(f, "trimmed at {}", threshold),
        }
    }
}

/// Cleanup stage result
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupSummary {
    pub state: TrimState,
    /// Engine report of each applied pass, in schedule order
    pub passes: Vec<(Distance, TrimReport)>,
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run: RunContext,
    pub layout: RunLayout,
    pub cataloged: usize,
    pub extraction: ExtractionResultSet,
    pub mosaic: MosaicRaster,
    pub dataset: ShorelineVectorDataset,
    pub cleanup: CleanupSummary,
    pub elapsed: Duration,
}
