//! A scripted stand-in for the external toolkit.
//!
//! Every call is recorded; outputs are written as empty files (or a scripted
//! GeoJSON dataset for tracing) so that downstream stages see real paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use shoreline_common::{utils, ColormapMode, Distance, MosaicMethod};

use crate::driver::{
    Cancellation, DriverError, GeometryEngine, MosaicEngine, ShorelineDetector, TracingEngine,
};
use crate::requests::{DetectionRequest, MosaicRequest, TraceRequest, TrimLineRequest, TrimReport};

/// One recorded engine invocation
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Detect {
        input: PathBuf,
        output_file: String,
        green_band: u8,
        nir_band: u8,
    },
    Mosaic {
        inputs: Vec<PathBuf>,
        method: MosaicMethod,
        colormap_mode: ColormapMode,
    },
    Trace {
        input: PathBuf,
        output: PathBuf,
    },
    Trim {
        features: PathBuf,
        dangle_length: Distance,
        delete_shorts: bool,
    },
}

/// Scripted behaviour for one raster, keyed by base name
#[derive(Debug, Clone)]
enum DetectionScript {
    Fail(String),
    Panic,
    Delay(Duration),
}

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    detection: HashMap<String, DetectionScript>,
    mosaic_failure: Option<String>,
    trace_failure: Option<String>,
    traced_dataset: Option<String>,
    trim_rejection: Option<f64>,
    calls: Mutex<Vec<EngineCall>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detection on the raster with this base name returns an engine error
    pub fn failing_detection(mut self, base_name: &str, cause: &str) -> Self {
        self.detection
            .insert(base_name.to_string(), DetectionScript::Fail(cause.to_string()));
        self
    }

    /// Detection on the raster with this base name panics
    pub fn panicking_detection(mut self, base_name: &str) -> Self {
        self.detection
            .insert(base_name.to_string(), DetectionScript::Panic);
        self
    }

    /// Detection on the raster with this base name blocks before succeeding,
    /// giving up early with [`DriverError::Cancelled`] when cancelled
    pub fn delaying_detection(mut self, base_name: &str, delay: Duration) -> Self {
        self.detection
            .insert(base_name.to_string(), DetectionScript::Delay(delay));
        self
    }

    pub fn failing_mosaic(mut self, cause: &str) -> Self {
        self.mosaic_failure = Some(cause.to_string());
        self
    }

    pub fn failing_trace(mut self, cause: &str) -> Self {
        self.trace_failure = Some(cause.to_string());
        self
    }

    /// GeoJSON content written by a successful trace
    pub fn tracing_to(mut self, geojson: impl Into<String>) -> Self {
        self.traced_dataset = Some(geojson.into());
        self
    }

    /// Trimming at this threshold (in metres) is rejected
    pub fn rejecting_trim_at(mut self, meters: f64) -> Self {
        self.trim_rejection = Some(meters);
        self
    }

    /// Every call recorded so far, in invocation order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock_calls().clone()
    }

    pub fn detection_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Detect { .. }))
            .count()
    }

    pub fn mosaic_calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Mosaic { inputs, .. } => Some(inputs),
                _ => None,
            })
            .collect()
    }

    pub fn trim_thresholds(&self) -> Vec<Distance> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Trim { dangle_length, .. } => Some(dangle_length),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: EngineCall) {
        self.lock_calls().push(call);
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<EngineCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn wait(delay: Duration, cancel: &Cancellation) -> Result<(), DriverError> {
    let deadline = Instant::now() + delay;
    while Instant::now() < deadline {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

fn touch(path: &Path, content: &[u8]) -> Result<(), DriverError> {
    std::fs::write(path, content)
        .map_err(|e| DriverError::Execution(format!("Cannot write {}: {}", path.display(), e)))
}

impl ShorelineDetector for ScriptedEngine {
    fn detect(
        &self,
        request: &DetectionRequest,
        cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError> {
        self.record(EngineCall::Detect {
            input: request.input.clone(),
            output_file: request.output_file.clone(),
            green_band: request.green_band,
            nir_band: request.nir_band,
        });

        let base_name = utils::raster_base_name(&request.input.to_string_lossy()).to_string();
        match self.detection.get(&base_name) {
            Some(DetectionScript::Fail(cause)) => {
                return Err(DriverError::Execution(cause.clone()))
            }
            Some(DetectionScript::Panic) => panic!("scripted detection panic on {base_name}"),
            Some(DetectionScript::Delay(delay)) => wait(*delay, cancel)?,
            None => {}
        }

        let output = request.output_path();
        touch(&output, b"")?;
        Ok(output)
    }
}

impl MosaicEngine for ScriptedEngine {
    fn mosaic_to_new_raster(
        &self,
        request: &MosaicRequest,
        _cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError> {
        self.record(EngineCall::Mosaic {
            inputs: request.inputs.clone(),
            method: request.method,
            colormap_mode: request.colormap_mode,
        });

        if let Some(cause) = &self.mosaic_failure {
            return Err(DriverError::Execution(cause.clone()));
        }

        let output = request.output_path();
        touch(&output, b"")?;
        Ok(output)
    }
}

impl TracingEngine for ScriptedEngine {
    fn raster_to_polyline(
        &self,
        request: &TraceRequest,
        _cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError> {
        self.record(EngineCall::Trace {
            input: request.input.clone(),
            output: request.output_features.clone(),
        });

        if let Some(cause) = &self.trace_failure {
            return Err(DriverError::Rejected(cause.clone()));
        }

        let content = self.traced_dataset.as_deref().unwrap_or_default();
        touch(&request.output_features, content.as_bytes())?;
        Ok(request.output_features.clone())
    }
}

impl GeometryEngine for ScriptedEngine {
    fn trim_line(
        &self,
        request: &TrimLineRequest,
        _cancel: &Cancellation,
    ) -> Result<TrimReport, DriverError> {
        self.record(EngineCall::Trim {
            features: request.features.clone(),
            dangle_length: request.dangle_length,
            delete_shorts: request.delete_shorts,
        });

        match self.trim_rejection {
            Some(meters) if meters == request.dangle_length.to_meters() => Err(
                DriverError::Rejected(format!("invalid geometry at {}", request.dangle_length)),
            ),
            _ => Ok(TrimReport::default()),
        }
    }
}
