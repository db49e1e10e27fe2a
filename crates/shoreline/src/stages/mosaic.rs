use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engines::driver::MosaicEngine;
use engines::MosaicRequest;
use shoreline_common::{ColormapMode, MosaicMethod, PixelType, RunLayout, SpatialReference};
use tracing::info;

use crate::blocking::call_blocking;
use crate::error::{PipelineError, Result};
use crate::types::MosaicRaster;

/// Merges the per-raster shorelines into one raster.
///
/// Overlapping pixels keep the maximum value; equal candidates resolve to
/// the earliest input, so the order of `inputs` is significant.
#[derive(Clone)]
pub struct MosaicStage {
    engine: Arc<dyn MosaicEngine>,
    spatial_reference: SpatialReference,
    timeout: Option<Duration>,
}

impl MosaicStage {
    pub const PIXEL_TYPE: PixelType = PixelType::Signed32;
    pub const BAND_COUNT: u8 = 1;
    pub const METHOD: MosaicMethod = MosaicMethod::Maximum;
    pub const COLORMAP_MODE: ColormapMode = ColormapMode::First;

    pub fn new(engine: Arc<dyn MosaicEngine>) -> Self {
        Self {
            engine,
            spatial_reference: SpatialReference::utm_zone_17n(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_for(&self, inputs: &[PathBuf], layout: &RunLayout) -> MosaicRequest {
        MosaicRequest {
            inputs: inputs.to_vec(),
            output_location: layout.mosaics_dir.clone(),
            dataset_name: layout.mosaic_name.clone(),
            spatial_reference: self.spatial_reference.clone(),
            pixel_type: Self::PIXEL_TYPE,
            band_count: Self::BAND_COUNT,
            method: Self::METHOD,
            colormap_mode: Self::COLORMAP_MODE,
        }
    }

    /// `failures` is only used to describe an empty input
    pub async fn run(
        &self,
        inputs: &[PathBuf],
        failures: usize,
        layout: &RunLayout,
    ) -> Result<MosaicRaster> {
        if inputs.is_empty() {
            return Err(PipelineError::EmptyMosaicInput { failures });
        }

        let request = self.request_for(inputs, layout);
        info!(
            "Mosaicking {} shoreline rasters into {} ({} / {})",
            inputs.len(),
            request.dataset_name,
            request.method,
            request.colormap_mode
        );

        let engine = Arc::clone(&self.engine);
        let call = request.clone();
        let path = call_blocking(self.timeout, move |cancel| {
            engine.mosaic_to_new_raster(&call, cancel)
        })
        .await
        .map_err(PipelineError::MosaicFailed)?;

        Ok(MosaicRaster {
            path,
            method: request.method,
            colormap_mode: request.colormap_mode,
            pixel_type: request.pixel_type,
            band_count: request.band_count,
            spatial_reference: request.spatial_reference,
            input_count: inputs.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::CallError;
    use engines::driver::scripted::{EngineCall, ScriptedEngine};
    use shoreline_common::{ProjectLocation, RunContext};
    use std::fs;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> RunLayout {
        let layout = RunContext::from_counter(1).layout(&ProjectLocation::new(dir.path(), "Huron"));
        fs::create_dir_all(&layout.mosaics_dir).unwrap();
        layout
    }

    #[tokio::test]
    async fn test_empty_input_never_reaches_engine() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new());

        let err = MosaicStage::new(engine.clone())
            .run(&[], 4, &layout(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyMosaicInput { failures: 4 }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fixed_policy_and_input_order() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let engine = Arc::new(ScriptedEngine::new());
        let inputs = vec![PathBuf::from("/s/shore_b.tif"), PathBuf::from("/s/shore_a.tif")];

        let mosaic = MosaicStage::new(engine.clone())
            .run(&inputs, 0, &layout)
            .await
            .unwrap();

        assert_eq!(mosaic.path, layout.mosaic_file);
        assert_eq!(mosaic.input_count, 2);
        assert_eq!(mosaic.pixel_type.to_string(), "32_BIT_SIGNED");
        assert_eq!(
            engine.calls(),
            vec![EngineCall::Mosaic {
                inputs,
                method: MosaicMethod::Maximum,
                colormap_mode: ColormapMode::First,
            }]
        );
    }

    #[test]
    fn test_request_parameters() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let stage = MosaicStage::new(Arc::new(ScriptedEngine::new()));

        let request = stage.request_for(&[PathBuf::from("/s/shore_a.tif")], &layout);
        assert_eq!(request.dataset_name, "code_mosaic1.tif");
        assert_eq!(request.band_count, 1);
        assert_eq!(request.spatial_reference.name, "WGS_1984_UTM_Zone_17N");
    }

    #[tokio::test]
    async fn test_engine_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new().failing_mosaic("extent mismatch"));

        let err = MosaicStage::new(engine)
            .run(&[PathBuf::from("/s/shore_a.tif")], 0, &layout(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MosaicFailed(CallError::Engine(_))));
        assert_eq!(err.stage(), crate::error::Stage::Mosaic);
    }
}
