pub mod driver;
pub mod requests;
pub mod sources;

use std::sync::Arc;

use driver::{GeometryEngine, MosaicEngine, ShorelineDetector, TracingEngine};

pub use requests::{DetectionRequest, MosaicRequest, TraceRequest, TrimLineRequest, TrimReport};

/// The four external collaborators the pipeline consumes.
///
/// Engines are shared behind `Arc` because extraction runs them from a pool
/// of blocking workers.
#[derive(Clone)]
pub struct EngineSet {
    pub detector: Arc<dyn ShorelineDetector>,
    pub mosaic: Arc<dyn MosaicEngine>,
    pub tracer: Arc<dyn TracingEngine>,
    pub geometry: Arc<dyn GeometryEngine>,
}

impl EngineSet {
    pub fn new(
        detector: Arc<dyn ShorelineDetector>,
        mosaic: Arc<dyn MosaicEngine>,
        tracer: Arc<dyn TracingEngine>,
        geometry: Arc<dyn GeometryEngine>,
    ) -> Self {
        Self {
            detector,
            mosaic,
            tracer,
            geometry,
        }
    }

    /// Use one engine for every role
    pub fn uniform<E>(engine: Arc<E>) -> Self
    where
        E: ShorelineDetector + MosaicEngine + TracingEngine + GeometryEngine + 'static,
    {
        Self {
            detector: engine.clone(),
            mosaic: engine.clone(),
            tracer: engine.clone(),
            geometry: engine,
        }
    }

    /// Replace the geometry engine (e.g. with the native backend)
    pub fn with_geometry(mut self, geometry: Arc<dyn GeometryEngine>) -> Self {
        self.geometry = geometry;
        self
    }
}

impl std::fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSet").finish_non_exhaustive()
    }
}

#[cfg(feature = "toolbox")]
use {driver::DriverError, std::path::PathBuf};

#[cfg(feature = "toolbox")]
impl EngineSet {
    /// Every role served by the external toolkit, runner found on the PATH
    pub fn toolbox_default(toolbox: impl Into<PathBuf>) -> Result<Self, DriverError> {
        use driver::toolbox::ToolboxDriver;

        let driver = ToolboxDriver::new(toolbox)?;
        Ok(Self::uniform(Arc::new(driver)))
    }

    pub fn toolbox_with_runner(
        toolbox: impl Into<PathBuf>,
        runner: impl Into<PathBuf>,
        runner_args: Vec<String>,
    ) -> Result<Self, DriverError> {
        use driver::toolbox::ToolboxDriver;

        let driver = ToolboxDriver::with_runner(runner, runner_args, toolbox)?;
        Ok(Self::uniform(Arc::new(driver)))
    }
}

#[cfg(feature = "native")]
impl EngineSet {
    /// Trim dangles in-process instead of through the toolkit; runs then trace
    /// their dataset to GeoJSON
    pub fn with_native_trimming(self) -> Self {
        self.with_geometry(Arc::new(driver::native::GeoLineEngine::default()))
    }
}
