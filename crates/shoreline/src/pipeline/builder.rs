use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use engines::EngineSet;
use shoreline_common::ProjectLocation;

use crate::{
    catalog::RasterCatalog,
    error::{PipelineError, Result},
    pipeline::PipelineOrchestrator,
    stages::{DangleCleanupStage, MosaicStage, ShorelineExtractionStage, VectorizationStage},
    types::TrimSchedule,
};

/// Per-call limits of each stage; `None` waits indefinitely
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimeouts {
    pub extraction: Option<Duration>,
    pub mosaic: Option<Duration>,
    pub vectorization: Option<Duration>,
    pub cleanup: Option<Duration>,
}

/// Builder for a [`PipelineOrchestrator`] with a fluent API
pub struct OrchestratorBuilder {
    project: Option<ProjectLocation>,
    input_root: Option<PathBuf>,
    engines: Option<EngineSet>,
    workers: usize,
    timeouts: StageTimeouts,
    minimum_segment_length: f64,
    schedule: TrimSchedule,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            project: None,
            input_root: None,
            engines: None,
            workers: default_workers(),
            timeouts: StageTimeouts::default(),
            minimum_segment_length: 0.0,
            schedule: TrimSchedule::default(),
        }
    }

    /// Where run folders are created; the shared container must already exist
    pub fn project(mut self, project: ProjectLocation) -> Self {
        self.project = Some(project);
        self
    }

    /// Directory searched recursively for input rasters
    pub fn input_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.input_root = Some(root.into());
        self
    }

    pub fn engines(mut self, engines: EngineSet) -> Self {
        self.engines = Some(engines);
        self
    }

    /// Concurrent shoreline extractions (defaults to the available parallelism)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn minimum_segment_length(mut self, length: f64) -> Self {
        self.minimum_segment_length = length;
        self
    }

    pub fn trim_schedule(mut self, schedule: TrimSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Validate the configuration and assemble the stages.
    ///
    /// Every check here runs before any folder is created or engine called.
    pub fn build(self) -> Result<PipelineOrchestrator> {
        let project = self
            .project
            .ok_or_else(|| PipelineError::Configuration("project location is required".to_string()))?;
        let input_root = self
            .input_root
            .ok_or_else(|| PipelineError::Configuration("input root is required".to_string()))?;
        let engines = self
            .engines
            .ok_or_else(|| PipelineError::Configuration("engines are required".to_string()))?;

        if self.workers == 0 {
            return Err(PipelineError::Configuration(
                "at least one extraction worker is required".to_string(),
            ));
        }
        if !self.minimum_segment_length.is_finite() || self.minimum_segment_length < 0.0 {
            return Err(PipelineError::Configuration(format!(
                "minimum segment length must be a non-negative number, got {}",
                self.minimum_segment_length
            )));
        }
        if !input_root.is_dir() {
            return Err(PipelineError::Configuration(format!(
                "input root {} is not a directory",
                input_root.display()
            )));
        }
        if !project.root.is_dir() {
            return Err(PipelineError::Configuration(format!(
                "project root {} is not a directory",
                project.root.display()
            )));
        }
        if project.name.is_empty() {
            return Err(PipelineError::Configuration(
                "project name must not be empty".to_string(),
            ));
        }

        let dataset_extension = engines.geometry.dataset_extension();
        let extraction = ShorelineExtractionStage::new(engines.detector)
            .with_workers(self.workers)
            .with_timeout(self.timeouts.extraction);
        let mosaic = MosaicStage::new(engines.mosaic).with_timeout(self.timeouts.mosaic);
        let vectorization = VectorizationStage::new(engines.tracer)
            .with_minimum_segment_length(self.minimum_segment_length)
            .with_timeout(self.timeouts.vectorization);
        let cleanup = DangleCleanupStage::new(engines.geometry)
            .with_schedule(self.schedule)
            .with_timeout(self.timeouts.cleanup);

        Ok(PipelineOrchestrator::new(
            project,
            dataset_extension,
            RasterCatalog::new(input_root),
            extraction,
            mosaic,
            vectorization,
            cleanup,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engines::driver::scripted::ScriptedEngine;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn configured(dir: &TempDir) -> OrchestratorBuilder {
        let input = dir.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        OrchestratorBuilder::new()
            .project(ProjectLocation::new(dir.path(), "Huron"))
            .input_root(input)
            .engines(EngineSet::uniform(Arc::new(ScriptedEngine::new())))
    }

    fn config_error(builder: OrchestratorBuilder) -> String {
        match builder.build() {
            Err(PipelineError::Configuration(message)) => message,
            Err(other) => panic!("expected a configuration error, got {:?}", other),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_builds_with_defaults() {
        let dir = TempDir::new().unwrap();
        let orchestrator = configured(&dir).build().unwrap();
        assert!(orchestrator.info().contains("3 trim passes"));
    }

    #[test]
    fn test_missing_engines() {
        let dir = TempDir::new().unwrap();
        let builder = OrchestratorBuilder::new()
            .project(ProjectLocation::new(dir.path(), "Huron"))
            .input_root(dir.path());
        assert!(config_error(builder).contains("engines"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(config_error(configured(&dir).workers(0)).contains("worker"));
    }

    #[test]
    fn test_invalid_roots_rejected() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(config_error(configured(&dir).input_root(&missing)).contains("input root"));
        assert!(config_error(
            configured(&dir).project(ProjectLocation::new(&missing, "Huron"))
        )
        .contains("project root"));
    }

    #[test]
    fn test_negative_segment_length_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(config_error(configured(&dir).minimum_segment_length(-1.0))
            .contains("minimum segment length"));
    }
}
