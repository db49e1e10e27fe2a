//! # Shoreline Batch Pipeline
//!
//! Turns a directory tree of satellite rasters into one cleaned shoreline
//! line dataset. Each stage hands its output to the next:
//!
//! 1. [`RasterCatalog`] finds the input rasters, skipping quality masks
//! 2. [`ShorelineExtractionStage`] detects a shoreline per raster; a failing
//!    raster is recorded and skipped
//! 3. [`MosaicStage`] merges the successful shorelines (maximum, first on tie)
//! 4. [`VectorizationStage`] traces the mosaic into line features
//! 5. [`DangleCleanupStage`] trims short dangles at 3, 6 and 9 metres
//!
//! The external engines are reached through the traits of the `engines`
//! crate, so every stage runs unchanged against the scripted test engine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use engines::EngineSet;
//! use shoreline::PipelineOrchestrator;
//! use shoreline_common::{ProjectLocation, RunContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = PipelineOrchestrator::builder()
//!     .project(ProjectLocation::new("/data/Huron", "Huron"))
//!     .input_root("/data/Huron/scenes")
//!     .engines(EngineSet::toolbox_default("/opt/toolboxes/Shoreline.pyt")?)
//!     .build()?;
//!
//! let report = orchestrator.run(&RunContext::from_counter(1)).await?;
//! println!("{} of {} rasters merged", report.mosaic.input_count, report.cataloged);
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod catalog;
pub mod error;
pub mod pipeline;
pub mod stages;
pub mod types;

// Re-exports for convenience
pub use blocking::CallError;
pub use catalog::RasterCatalog;
pub use error::{PipelineError, Result, Stage};
pub use pipeline::{OrchestratorBuilder, PipelineOrchestrator, StageTimeouts};
pub use stages::{DangleCleanupStage, MosaicStage, ShorelineExtractionStage, VectorizationStage};
pub use types::{
    CleanupSummary, DangleTrimPass, ExtractionOutcome, ExtractionResultSet, MosaicRaster,
    PipelineReport, Raster, ShorelineVectorDataset, TrimSchedule, TrimState,
};
