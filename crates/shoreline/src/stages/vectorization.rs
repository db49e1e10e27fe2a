use std::sync::Arc;
use std::time::Duration;

use engines::driver::{DriverError, TracingEngine};
use engines::TraceRequest;
use shoreline_common::{BackgroundValue, RunLayout};
use tracing::info;

use crate::blocking::{call_blocking, CallError};
use crate::error::{PipelineError, Result};
use crate::types::{MosaicRaster, ShorelineVectorDataset};

/// Traces the merged raster into simplified line features
#[derive(Clone)]
pub struct VectorizationStage {
    engine: Arc<dyn TracingEngine>,
    minimum_segment_length: f64,
    timeout: Option<Duration>,
}

impl VectorizationStage {
    pub const BACKGROUND: BackgroundValue = BackgroundValue::Zero;
    pub const RASTER_FIELD: &'static str = "Value";

    pub fn new(engine: Arc<dyn TracingEngine>) -> Self {
        Self {
            engine,
            minimum_segment_length: 0.0,
            timeout: None,
        }
    }

    /// Shortest dangle the tracer keeps, in map units; `0` keeps everything
    pub fn with_minimum_segment_length(mut self, length: f64) -> Self {
        self.minimum_segment_length = length;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_for(&self, mosaic: &MosaicRaster, layout: &RunLayout) -> TraceRequest {
        TraceRequest {
            input: mosaic.path.clone(),
            output_features: layout.vector_dataset.clone(),
            background: Self::BACKGROUND,
            minimum_dangle_length: self.minimum_segment_length,
            simplify: true,
            raster_field: Self::RASTER_FIELD.to_string(),
        }
    }

    pub async fn run(
        &self,
        mosaic: &MosaicRaster,
        layout: &RunLayout,
    ) -> Result<ShorelineVectorDataset> {
        if !mosaic.path.is_file() {
            return Err(PipelineError::VectorizationFailed(CallError::Engine(
                DriverError::Rejected(format!("mosaic {} is missing", mosaic.path.display())),
            )));
        }

        let request = self.request_for(mosaic, layout);
        info!(
            "Tracing {} into {}",
            mosaic.path.display(),
            request.output_features.display()
        );

        let engine = Arc::clone(&self.engine);
        let call = request.clone();
        let path = call_blocking(self.timeout, move |cancel| {
            engine.raster_to_polyline(&call, cancel)
        })
        .await
        .map_err(PipelineError::VectorizationFailed)?;

        Ok(ShorelineVectorDataset {
            path,
            background: request.background,
            minimum_segment_length: request.minimum_dangle_length,
            simplify: request.simplify,
            raster_field: request.raster_field,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engines::driver::scripted::{EngineCall, ScriptedEngine};
    use shoreline_common::{
        ColormapMode, MosaicMethod, PixelType, ProjectLocation, RunContext, SpatialReference,
    };
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        layout: RunLayout,
        mosaic: MosaicRaster,
    }

    fn fixture(write_mosaic: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let layout = RunContext::from_counter(5).layout(&ProjectLocation::new(dir.path(), "Huron"));
        fs::create_dir_all(&layout.mosaics_dir).unwrap();
        fs::create_dir_all(&layout.container).unwrap();
        if write_mosaic {
            fs::write(&layout.mosaic_file, b"").unwrap();
        }

        let mosaic = MosaicRaster {
            path: layout.mosaic_file.clone(),
            method: MosaicMethod::Maximum,
            colormap_mode: ColormapMode::First,
            pixel_type: PixelType::Signed32,
            band_count: 1,
            spatial_reference: SpatialReference::default(),
            input_count: 1,
        };
        Fixture {
            _dir: dir,
            layout,
            mosaic,
        }
    }

    #[tokio::test]
    async fn test_traces_into_project_container() {
        let fx = fixture(true);
        let engine = Arc::new(ScriptedEngine::new());

        let dataset = VectorizationStage::new(engine.clone())
            .run(&fx.mosaic, &fx.layout)
            .await
            .unwrap();

        assert_eq!(dataset.path, fx.layout.vector_dataset);
        assert!(dataset.path.ends_with("Huron.gdb/code_shoreline5"));
        assert_eq!(dataset.background, BackgroundValue::Zero);
        assert_eq!(dataset.minimum_segment_length, 0.0);
        assert!(dataset.simplify);
        assert_eq!(dataset.raster_field, "Value");
        assert_eq!(
            engine.calls(),
            vec![EngineCall::Trace {
                input: fx.layout.mosaic_file.clone(),
                output: fx.layout.vector_dataset.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_mosaic() {
        let fx = fixture(false);
        let engine = Arc::new(ScriptedEngine::new());

        let err = VectorizationStage::new(engine.clone())
            .run(&fx.mosaic, &fx.layout)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::VectorizationFailed(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_foreground_pixels() {
        let fx = fixture(true);
        let engine = Arc::new(ScriptedEngine::new().failing_trace("no non-background pixels"));

        let err = VectorizationStage::new(engine)
            .run(&fx.mosaic, &fx.layout)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no non-background pixels"));
    }

    #[test]
    fn test_minimum_segment_length_is_forwarded() {
        let fx = fixture(true);
        let request = VectorizationStage::new(Arc::new(ScriptedEngine::new()))
            .with_minimum_segment_length(2.5)
            .request_for(&fx.mosaic, &fx.layout);
        assert_eq!(request.minimum_dangle_length, 2.5);
        assert_eq!(request.background.to_string(), "ZERO");
    }
}
