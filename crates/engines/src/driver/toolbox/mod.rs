use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::driver::{
    Cancellation, DriverError, GeometryEngine, MosaicEngine, ShorelineDetector, TracingEngine,
};
use crate::requests::{DetectionRequest, MosaicRequest, TraceRequest, TrimLineRequest, TrimReport};
use crate::sources::{Sink, Source};

/// Tool names as exposed by the geoprocessing toolkit
pub mod tools {
    pub const SHORELINE_DETECTION: &str = "ShorelineDetection.ShorelineDetection";
    pub const MOSAIC_TO_NEW_RASTER: &str = "management.MosaicToNewRaster";
    pub const RASTER_TO_POLYLINE: &str = "conversion.RasterToPolyline";
    pub const TRIM_LINE: &str = "edit.TrimLine";
}

/// Python bridge that imports the toolbox and calls one tool with the
/// keyword arguments following it on the command line
pub const BRIDGE_SCRIPT: &str = include_str!("bridge.py");

/// How often a running tool is checked for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Driver for the external geoprocessing toolkit.
///
/// Each engine call becomes one child process of the toolkit's interpreter:
/// `<runner> [runner args] -c <bridge> <toolbox> <group.Tool> Key=Value ...`
#[derive(Debug, Clone)]
pub struct ToolboxDriver {
    runner: PathBuf,
    runner_args: Vec<String>,
    toolbox: PathBuf,
}

impl ToolboxDriver {
    /// Locate a runner on the PATH and bind it to a toolbox
    pub fn new(toolbox: impl Into<PathBuf>) -> Result<Self, DriverError> {
        let runner = Self::find_runner_executable()?;
        Self::with_runner(runner, Vec::new(), toolbox)
    }

    pub fn with_runner(
        runner: impl Into<PathBuf>,
        runner_args: Vec<String>,
        toolbox: impl Into<PathBuf>,
    ) -> Result<Self, DriverError> {
        let toolbox = toolbox.into();

        if !toolbox.exists() {
            return Err(DriverError::Initialization(format!(
                "Toolbox not found at: {}",
                toolbox.display()
            )));
        }

        Ok(Self {
            runner: runner.into(),
            runner_args,
            toolbox,
        })
    }

    pub fn toolbox(&self) -> &Path {
        &self.toolbox
    }

    fn find_runner_executable() -> Result<PathBuf, DriverError> {
        // The toolkit ships its own interpreter; prefer it over a system python
        for candidate in ["propy", "python3", "python"] {
            if let Ok(output) = Command::new("which").arg(candidate).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(DriverError::Initialization(
            "No toolkit runner found on PATH. Please install the toolkit or specify the runner."
                .to_string(),
        ))
    }

    fn base_command(&self, tool: &str) -> Command {
        let mut cmd = Command::new(&self.runner);
        cmd.args(&self.runner_args);
        cmd.arg("-c").arg(BRIDGE_SCRIPT);
        cmd.arg(&self.toolbox);
        cmd.arg(tool);
        cmd
    }

    pub fn build_detection_command(&self, request: &DetectionRequest) -> Command {
        let mut cmd = self.base_command(tools::SHORELINE_DETECTION);
        cmd.args([
            keyword("InputSatelliteImage", &request.input),
            keyword("OutputLocation", &request.output_location),
            keyword("OutputFile", &request.output_file),
            keyword("GreenBandNumber", request.green_band.to_string()),
            keyword("NIRBandNumber", request.nir_band.to_string()),
        ]);
        cmd
    }

    pub fn build_mosaic_command(&self, request: &MosaicRequest) -> Command {
        let mut inputs = OsString::new();
        for (i, input) in request.inputs.iter().enumerate() {
            if i > 0 {
                inputs.push(";");
            }
            inputs.push(input);
        }

        let mut cmd = self.base_command(tools::MOSAIC_TO_NEW_RASTER);
        cmd.args([
            keyword("input_rasters", inputs),
            keyword("output_location", &request.output_location),
            keyword("raster_dataset_name_with_extension", &request.dataset_name),
            keyword("coordinate_system_for_the_raster", &request.spatial_reference.wkt),
            keyword("pixel_type", request.pixel_type.to_string()),
            keyword("cellsize", ""),
            keyword("number_of_bands", request.band_count.to_string()),
            keyword("mosaic_method", request.method.to_string()),
            keyword("mosaic_colormap_mode", request.colormap_mode.to_string()),
        ]);
        cmd
    }

    pub fn build_trace_command(&self, request: &TraceRequest) -> Command {
        let simplify = if request.simplify { "SIMPLIFY" } else { "NO_SIMPLIFY" };

        let mut cmd = self.base_command(tools::RASTER_TO_POLYLINE);
        cmd.args([
            keyword("in_raster", &request.input),
            keyword("out_polyline_features", &request.output_features),
            keyword("background_value", request.background.to_string()),
            keyword("minimum_dangle_length", request.minimum_dangle_length.to_string()),
            keyword("simplify", simplify),
            keyword("raster_field", &request.raster_field),
        ]);
        cmd
    }

    pub fn build_trim_command(&self, request: &TrimLineRequest) -> Command {
        let delete_shorts = if request.delete_shorts { "DELETE_SHORT" } else { "KEEP_SHORT" };

        let mut cmd = self.base_command(tools::TRIM_LINE);
        cmd.args([
            keyword("in_features", &request.features),
            keyword("dangle_length", request.dangle_length.to_string()),
            keyword("delete_shorts", delete_shorts),
        ]);
        cmd
    }

    /// Run one tool to completion, killing it as soon as `cancel` is raised
    fn execute_command(&self, mut cmd: Command, cancel: &Cancellation) -> Result<(), DriverError> {
        debug!("Executing toolkit command: {:?}", cmd);

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DriverError::Execution(format!("Failed to launch toolkit: {}", e)))?;

        // Drained on its own thread so a verbose tool never stalls on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                warn!("Killed toolkit process {}", child.id());
                return Err(DriverError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(DriverError::Execution(format!(
                        "Lost track of toolkit process: {}",
                        e
                    )));
                }
            }
        };

        if !status.success() {
            let stderr = stderr
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default();
            return Err(DriverError::Execution(format!(
                "Toolkit exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        debug!("Toolkit command executed successfully");
        Ok(())
    }
}

fn keyword(name: &str, value: impl AsRef<std::ffi::OsStr>) -> OsString {
    let mut arg = OsString::from(name);
    arg.push("=");
    arg.push(value);
    arg
}

fn ensure_written(path: PathBuf) -> Result<PathBuf, DriverError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(DriverError::Execution(format!(
            "Toolkit reported success but wrote no output at {}",
            path.display()
        )))
    }
}

impl ShorelineDetector for ToolboxDriver {
    fn detect(
        &self,
        request: &DetectionRequest,
        cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError> {
        request.source().validate()?;
        request.sink().validate()?;

        self.execute_command(self.build_detection_command(request), cancel)?;
        ensure_written(request.output_path())
    }
}

impl MosaicEngine for ToolboxDriver {
    fn mosaic_to_new_raster(
        &self,
        request: &MosaicRequest,
        cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError> {
        for source in request.sources() {
            source.validate()?;
        }
        request.sink().validate()?;

        self.execute_command(self.build_mosaic_command(request), cancel)?;
        ensure_written(request.output_path())
    }
}

impl TracingEngine for ToolboxDriver {
    fn raster_to_polyline(
        &self,
        request: &TraceRequest,
        cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError> {
        request.source().validate()?;
        request.sink().validate()?;

        // A feature class inside a geodatabase has no file of its own to check
        self.execute_command(self.build_trace_command(request), cancel)?;
        Ok(request.output_features.clone())
    }
}

impl GeometryEngine for ToolboxDriver {
    fn trim_line(
        &self,
        request: &TrimLineRequest,
        cancel: &Cancellation,
    ) -> Result<TrimReport, DriverError> {
        // The dataset may be a geodatabase feature class; the toolkit resolves it
        self.execute_command(self.build_trim_command(request), cancel)?;
        Ok(TrimReport::default())
    }
}
