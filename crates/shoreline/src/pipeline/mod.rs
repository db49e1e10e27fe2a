pub mod builder;

use std::fs;
use std::io;
use std::time::Instant;

use shoreline_common::{ProjectLocation, RunContext, RunLayout};
use tracing::{error, info};

use crate::{
    catalog::RasterCatalog,
    error::{PipelineError, Result},
    stages::{DangleCleanupStage, MosaicStage, ShorelineExtractionStage, VectorizationStage},
    types::PipelineReport,
};

pub use builder::{OrchestratorBuilder, StageTimeouts};

/// Sequences the stages of one batch run and owns its storage
pub struct PipelineOrchestrator {
    project: ProjectLocation,
    dataset_extension: Option<&'static str>,
    catalog: RasterCatalog,
    extraction: ShorelineExtractionStage,
    mosaic: MosaicStage,
    vectorization: VectorizationStage,
    cleanup: DangleCleanupStage,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator builder
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn new(
        project: ProjectLocation,
        dataset_extension: Option<&'static str>,
        catalog: RasterCatalog,
        extraction: ShorelineExtractionStage,
        mosaic: MosaicStage,
        vectorization: VectorizationStage,
        cleanup: DangleCleanupStage,
    ) -> Self {
        Self {
            project,
            dataset_extension,
            catalog,
            extraction,
            mosaic,
            vectorization,
            cleanup,
        }
    }

    pub fn project(&self) -> &ProjectLocation {
        &self.project
    }

    pub fn catalog(&self) -> &RasterCatalog {
        &self.catalog
    }

    /// Every location a run writes, with the dataset named the way the
    /// geometry engine reads it
    pub fn layout(&self, run: &RunContext) -> RunLayout {
        let layout = run.layout(&self.project);
        match self.dataset_extension {
            Some(ext) => layout.with_dataset_extension(ext),
            None => layout,
        }
    }

    /// Create the run's own folders once the shared project container is
    /// known to exist.
    ///
    /// The container is never created here. Any output of this run that
    /// already exists on disk is a path collision.
    pub fn prepare_storage(&self, layout: &RunLayout) -> Result<()> {
        if !layout.container.is_dir() {
            return Err(PipelineError::MissingContainer(layout.container.clone()));
        }
        if let Some(taken) = layout.outputs().into_iter().find(|path| path.exists()) {
            return Err(PipelineError::PathCollision(taken.to_path_buf()));
        }

        for dir in layout.owned_dirs() {
            fs::create_dir(dir).map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => PipelineError::PathCollision(dir.to_path_buf()),
                _ => PipelineError::Storage {
                    path: dir.to_path_buf(),
                    source,
                },
            })?;
        }
        Ok(())
    }

    /// Run every stage in sequence for one run context
    pub async fn run(&self, run: &RunContext) -> Result<PipelineReport> {
        let result = self.execute(run).await;
        if let Err(e) = &result {
            error!("{} aborted in the {} stage: {}", run, e.stage(), e);
        }
        result
    }

    async fn execute(&self, run: &RunContext) -> Result<PipelineReport> {
        let started = Instant::now();
        let layout = self.layout(run);
        info!("Starting {} in {}", run, self.project.root.display());

        self.prepare_storage(&layout)?;

        let rasters = self.catalog.discover()?;
        info!(
            "Cataloged {} rasters under {}",
            rasters.len(),
            self.catalog.root().display()
        );

        let extraction = self.extraction.run(&rasters, &layout.shorelines_dir).await;
        info!(
            "Shoreline extraction finished: {} succeeded, {} failed",
            extraction.success_count(),
            extraction.failure_count()
        );

        let mosaic = self
            .mosaic
            .run(
                &extraction.successful_outputs(),
                extraction.failure_count(),
                &layout,
            )
            .await?;
        let dataset = self.vectorization.run(&mosaic, &layout).await?;
        let cleanup = self.cleanup.run(&dataset).await?;

        let elapsed = started.elapsed();
        info!("Process finished --- {:.2} seconds ---", elapsed.as_secs_f64());

        Ok(PipelineReport {
            run: run.clone(),
            layout,
            cataloged: rasters.len(),
            extraction,
            mosaic,
            dataset,
            cleanup,
            elapsed,
        })
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "Pipeline: rasters under {}, {} extraction workers, {} trim passes, project {}",
            self.catalog.root().display(),
            self.extraction.workers(),
            self.cleanup.schedule().passes().len(),
            self.project.container().display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::CallError;
    use crate::error::Stage;
    use crate::types::{ExtractionOutcome, TrimState};
    use engines::driver::native::{read_lines, to_geojson, LineFeature};
    use engines::driver::scripted::{EngineCall, ScriptedEngine};
    use engines::EngineSet;
    use shoreline_common::Distance;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new(rasters: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            let input = dir.path().join("scenes");
            fs::create_dir_all(&input).unwrap();
            fs::create_dir_all(dir.path().join("Huron.gdb")).unwrap();
            for name in rasters {
                fs::write(input.join(name), b"").unwrap();
            }
            Self { dir }
        }

        fn project(&self) -> ProjectLocation {
            ProjectLocation::new(self.dir.path(), "Huron")
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("scenes")
        }

        fn orchestrator(&self, engines: EngineSet) -> PipelineOrchestrator {
            PipelineOrchestrator::builder()
                .project(self.project())
                .input_root(self.input())
                .engines(engines)
                .workers(2)
                .build()
                .unwrap()
        }
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_five_rasters_one_mask_one_failure() {
        let ws = Workspace::new(&["s1.tif", "s1_udm.tif", "s2.tif", "s3.tif", "s4.tif"]);
        let engine = Arc::new(ScriptedEngine::new().failing_detection("s3", "no water"));
        let orchestrator = ws.orchestrator(EngineSet::uniform(engine.clone()));

        let report = orchestrator.run(&RunContext::from_counter(1)).await.unwrap();

        assert_eq!(report.cataloged, 4);
        assert_eq!(report.extraction.len(), 4);
        assert_eq!(report.extraction.success_count(), 3);
        assert_eq!(
            report.extraction.failures().map(|(name, _)| name).collect::<Vec<_>>(),
            ["s3"]
        );
        assert_eq!(engine.detection_calls(), 4);

        let mosaic_calls = engine.mosaic_calls();
        assert_eq!(mosaic_calls.len(), 1);
        assert_eq!(
            names(&mosaic_calls[0]),
            ["shore_s1.tif", "shore_s2.tif", "shore_s4.tif"]
        );
        assert!(mosaic_calls[0]
            .iter()
            .all(|p| p.starts_with(&report.layout.shorelines_dir)));
        assert_eq!(report.mosaic.input_count, 3);
        assert_eq!(report.cleanup.state, TrimState::TrimmedAt(Distance::meters(9.0).unwrap()));
    }

    #[tokio::test]
    async fn test_duplicate_base_names_reach_mosaic_once() {
        let ws = Workspace::new(&[]);
        for sub in ["a", "b"] {
            let dir = ws.input().join(sub);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("scene.tif"), b"").unwrap();
        }
        let engine = Arc::new(ScriptedEngine::new());

        let report = ws
            .orchestrator(EngineSet::uniform(engine.clone()))
            .run(&RunContext::from_counter(1))
            .await
            .unwrap();

        assert_eq!(report.extraction.success_count(), 1);
        assert!(matches!(
            report.extraction.failures().next(),
            Some(("scene", CallError::OutputClaimed { .. }))
        ));
        assert_eq!(names(&engine.mosaic_calls()[0]), ["shore_scene.tif"]);
    }

    #[tokio::test]
    async fn test_stage_order() {
        let ws = Workspace::new(&["a.tif"]);
        let engine = Arc::new(ScriptedEngine::new());

        ws.orchestrator(EngineSet::uniform(engine.clone()))
            .run(&RunContext::from_counter(1))
            .await
            .unwrap();

        let kinds: Vec<&str> = engine
            .calls()
            .iter()
            .map(|call| match call {
                EngineCall::Detect { .. } => "detect",
                EngineCall::Mosaic { .. } => "mosaic",
                EngineCall::Trace { .. } => "trace",
                EngineCall::Trim { .. } => "trim",
            })
            .collect();
        assert_eq!(kinds, ["detect", "mosaic", "trace", "trim", "trim", "trim"]);
    }

    #[tokio::test]
    async fn test_empty_catalog_calls_no_engine() {
        let ws = Workspace::new(&["only_udm.tif", "readme.txt"]);
        let engine = Arc::new(ScriptedEngine::new());

        let err = ws
            .orchestrator(EngineSet::uniform(engine.clone()))
            .run(&RunContext::from_counter(1))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyCatalog { .. }));
        assert_eq!(err.stage(), Stage::Catalog);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_all_extractions_failing_skips_mosaic() {
        let ws = Workspace::new(&["a.tif", "b.tif"]);
        let engine = Arc::new(
            ScriptedEngine::new()
                .failing_detection("a", "bad")
                .panicking_detection("b"),
        );

        let err = ws
            .orchestrator(EngineSet::uniform(engine.clone()))
            .run(&RunContext::from_counter(1))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyMosaicInput { failures: 2 }));
        assert!(engine.mosaic_calls().is_empty());
        assert_eq!(engine.detection_calls(), 2);
    }

    #[tokio::test]
    async fn test_trim_failure_reports_threshold() {
        let ws = Workspace::new(&["a.tif"]);
        let engine = Arc::new(ScriptedEngine::new().rejecting_trim_at(3.0));

        let err = ws
            .orchestrator(EngineSet::uniform(engine.clone()))
            .run(&RunContext::from_counter(1))
            .await
            .unwrap_err();

        match &err {
            PipelineError::TrimFailed {
                threshold,
                reached,
                cause: CallError::Engine(_),
            } => {
                assert_eq!(threshold.to_string(), "3 Meters");
                assert_eq!(*reached, TrimState::Untrimmed);
            }
            other => panic!("expected TrimFailed, got {:?}", other),
        }
        assert_eq!(err.stage(), Stage::Cleanup);
    }

    #[tokio::test]
    async fn test_distinct_runs_share_no_outputs() {
        let ws = Workspace::new(&["a.tif", "b.tif"]);
        let engine = Arc::new(ScriptedEngine::new());
        let orchestrator = ws.orchestrator(EngineSet::uniform(engine));

        let first = orchestrator.run(&RunContext::from_counter(1)).await.unwrap();
        let second = orchestrator.run(&RunContext::from_counter(2)).await.unwrap();

        for path in first.layout.outputs() {
            assert!(path.exists());
            assert!(!second.layout.outputs().contains(&path));
        }
        assert!(second.layout.outputs().iter().all(|p| p.exists()));
    }

    #[tokio::test]
    async fn test_reused_discriminator_is_a_collision() {
        let ws = Workspace::new(&["a.tif"]);
        let engine = Arc::new(ScriptedEngine::new());
        let orchestrator = ws.orchestrator(EngineSet::uniform(engine.clone()));
        orchestrator.run(&RunContext::from_counter(7)).await.unwrap();
        let calls_after_first = engine.calls().len();

        let err = orchestrator
            .run(&RunContext::from_counter(7))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PathCollision(_)));
        assert_eq!(err.stage(), Stage::Storage);
        assert_eq!(engine.calls().len(), calls_after_first);
    }

    #[test]
    fn test_prepare_storage_creates_run_folders() {
        let ws = Workspace::new(&[]);
        let orchestrator = ws.orchestrator(EngineSet::uniform(Arc::new(ScriptedEngine::new())));
        let layout = orchestrator.layout(&RunContext::from_counter(3));

        orchestrator.prepare_storage(&layout).unwrap();

        assert!(layout.shorelines_dir.ends_with("Output_Shorelines3"));
        assert!(layout.owned_dirs().iter().all(|d| d.is_dir()));
        assert!(!layout.vector_dataset.exists());
    }

    #[tokio::test]
    async fn test_missing_container_is_not_created() {
        let ws = Workspace::new(&["a.tif"]);
        fs::remove_dir(ws.dir.path().join("Huron.gdb")).unwrap();
        let engine = Arc::new(ScriptedEngine::new());
        let orchestrator = ws.orchestrator(EngineSet::uniform(engine.clone()));
        let run = RunContext::from_counter(1);

        let err = orchestrator.run(&run).await.unwrap_err();

        assert!(matches!(&err, PipelineError::MissingContainer(path) if path.ends_with("Huron.gdb")));
        assert_eq!(err.stage(), Stage::Storage);
        let layout = orchestrator.layout(&run);
        assert!(!layout.container.exists());
        assert!(layout.owned_dirs().iter().all(|d| !d.exists()));
        assert!(engine.calls().is_empty());
    }

    fn coastline_geojson() -> String {
        let features = vec![
            LineFeature::new(vec![[0.0, 0.0], [100.0, 0.0], [200.0, 0.0]]),
            LineFeature::new(vec![[100.0, 0.0], [100.0, 2.0]]),
            LineFeature::new(vec![[200.0, 0.0], [200.0, 5.0]]),
            LineFeature::new(vec![[200.0, 5.0], [201.0, 5.0]]),
        ];
        to_geojson(&features).to_string()
    }

    fn line_count(path: &Path) -> usize {
        read_lines(path).unwrap().len()
    }

    #[tokio::test]
    async fn test_end_to_end_with_native_trimming() {
        let ws = Workspace::new(&["a.tif", "b_udm.tif", "c.tif"]);
        let engine = Arc::new(ScriptedEngine::new().tracing_to(coastline_geojson()));
        let engines = EngineSet::uniform(engine.clone()).with_native_trimming();

        let report = ws
            .orchestrator(engines)
            .run(&RunContext::from_counter(1))
            .await
            .unwrap();

        assert!(report.extraction.outcomes().iter().all(ExtractionOutcome::is_success));
        // The tracer is asked for a GeoJSON file the native engine can read
        assert!(report.dataset.path.ends_with("Huron.gdb/code_shoreline1.geojson"));
        assert!(engine.calls().contains(&EngineCall::Trace {
            input: report.layout.mosaic_file.clone(),
            output: report.dataset.path.clone(),
        }));
        // Only the coastline itself survives the 3, 6 and 9 m passes
        assert_eq!(line_count(&report.dataset.path), 1);
        let remaining: Vec<_> = report
            .cleanup
            .passes
            .iter()
            .map(|(_, r)| r.remaining)
            .collect();
        assert_eq!(remaining, [Some(2), Some(1), Some(1)]);
        // The scripted engine served every role but trimming
        assert!(engine.trim_thresholds().is_empty());
    }
}
