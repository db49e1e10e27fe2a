use std::path::PathBuf;

use serde::Serialize;
use shoreline_common::{CommonError, Distance};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::blocking::CallError;
use crate::types::TrimState;

/// Pipeline step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuration,
    Storage,
    Catalog,
    Extraction,
    Mosaic,
    Vectorization,
    Cleanup,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Cannot create {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path collision: {0} already exists and belongs to another run")]
    PathCollision(PathBuf),

    #[error("Project container {0} does not exist; create it with the toolkit first")]
    MissingContainer(PathBuf),

    #[error("No eligible rasters found under {root}")]
    EmptyCatalog { root: PathBuf },

    #[error("Every shoreline extraction failed ({failures} failures); nothing to mosaic")]
    EmptyMosaicInput { failures: usize },

    #[error("Mosaic failed: {0}")]
    MosaicFailed(#[source] CallError),

    #[error("Vectorization failed: {0}")]
    VectorizationFailed(#[source] CallError),

    #[error("Dangle trimming failed at {threshold} (dataset left {reached}): {cause}")]
    TrimFailed {
        threshold: Distance,
        reached: TrimState,
        #[source]
        cause: CallError,
    },

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl PipelineError {
    /// The step that raised this failure
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) | Self::Common(_) => Stage::Configuration,
            Self::Storage { .. } | Self::PathCollision(_) | Self::MissingContainer(_) => {
                Stage::Storage
            }
            Self::EmptyCatalog { .. } => Stage::Catalog,
            Self::EmptyMosaicInput { .. } | Self::MosaicFailed(_) => Stage::Mosaic,
            Self::VectorizationFailed(_) => Stage::Vectorization,
            Self::TrimFailed { .. } => Stage::Cleanup,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
