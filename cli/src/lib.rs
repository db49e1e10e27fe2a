use engines::driver::DriverError;
use engines::EngineSet;
use shoreline::{PipelineError, PipelineOrchestrator, StageTimeouts};
use shoreline_common::{ProjectLocation, RunContext};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShorelineCliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Where the geoprocessing toolbox lives and what runs it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ToolboxSection {
    pub path: PathBuf,
    /// Python interpreter with the toolkit installed; searched on the PATH when omitted
    pub runner: Option<PathBuf>,
    /// Interpreter flags placed before the bridge script (e.g. `-u`)
    #[serde(default)]
    pub runner_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct InputSection {
    /// Directory searched recursively for `.tif` rasters
    pub root: PathBuf,
}

/// Which engine trims dangling lines
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrimBackend {
    #[default]
    Toolbox,
    /// In-process trimming; the traced dataset is exported as GeoJSON
    Native,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct RunSection {
    /// Reuse a numbered run; a timestamp discriminator is used when omitted
    pub counter: Option<u32>,
    /// Concurrent shoreline extractions; defaults to the available parallelism
    pub workers: Option<usize>,
    /// Shortest dangle kept while tracing, in map units
    pub minimum_segment_length: f64,
    pub trim_backend: TrimBackend,
}

/// Per-call limits in seconds; omitted limits wait indefinitely
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TimeoutSection {
    pub extraction_secs: Option<u64>,
    pub mosaic_secs: Option<u64>,
    pub vectorization_secs: Option<u64>,
    pub cleanup_secs: Option<u64>,
}

/// One batch shoreline job
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ShorelineJob {
    pub toolbox: ToolboxSection,
    pub input: InputSection,
    pub project: ProjectLocation,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

impl ShorelineJob {
    /// Load a job from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ShorelineCliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ShorelineCliError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a job from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ShorelineCliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ShorelineCliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load the job
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ShorelineCliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(ShorelineCliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String, ShorelineCliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, ShorelineCliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// JSON schema of the job file
    pub fn schema() -> Result<String, ShorelineCliError> {
        let schema = schemars::schema_for!(ShorelineJob);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    /// Fail fast on anything that would stop the run before its first stage
    pub fn validate(&self) -> Result<(), ShorelineCliError> {
        let invalid = |message: String| Err(ShorelineCliError::InvalidConfig(message));

        if !self.toolbox.path.is_file() {
            return invalid(format!("toolbox {} not found", self.toolbox.path.display()));
        }
        if !self.input.root.is_dir() {
            return invalid(format!(
                "input root {} is not a directory",
                self.input.root.display()
            ));
        }
        if !self.project.root.is_dir() {
            return invalid(format!(
                "project root {} is not a directory",
                self.project.root.display()
            ));
        }
        if self.project.name.trim().is_empty() {
            return invalid("project name must not be empty".to_string());
        }
        if !self.project.container().is_dir() {
            return invalid(format!(
                "project container {} does not exist",
                self.project.container().display()
            ));
        }
        if self.run.workers == Some(0) {
            return invalid("workers must be at least 1".to_string());
        }
        let length = self.run.minimum_segment_length;
        if !length.is_finite() || length < 0.0 {
            return invalid(format!(
                "minimum_segment_length must be a non-negative number, got {}",
                length
            ));
        }
        let timeouts = [
            ("extraction_secs", self.timeouts.extraction_secs),
            ("mosaic_secs", self.timeouts.mosaic_secs),
            ("vectorization_secs", self.timeouts.vectorization_secs),
            ("cleanup_secs", self.timeouts.cleanup_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == Some(0)) {
            return invalid(format!("timeouts.{} must be positive", name));
        }
        Ok(())
    }

    /// Run identity, with an optional counter overriding the configured one
    pub fn run_context(&self, counter: Option<u32>) -> RunContext {
        match counter.or(self.run.counter) {
            Some(counter) => RunContext::from_counter(counter),
            None => RunContext::timestamped(),
        }
    }

    pub fn stage_timeouts(&self) -> StageTimeouts {
        let secs = |limit: Option<u64>| limit.map(Duration::from_secs);
        StageTimeouts {
            extraction: secs(self.timeouts.extraction_secs),
            mosaic: secs(self.timeouts.mosaic_secs),
            vectorization: secs(self.timeouts.vectorization_secs),
            cleanup: secs(self.timeouts.cleanup_secs),
        }
    }

    pub fn engines(&self) -> Result<EngineSet, ShorelineCliError> {
        let engines = match &self.toolbox.runner {
            Some(runner) => EngineSet::toolbox_with_runner(
                &self.toolbox.path,
                runner,
                self.toolbox.runner_args.clone(),
            )?,
            None => EngineSet::toolbox_default(&self.toolbox.path)?,
        };

        Ok(match self.run.trim_backend {
            TrimBackend::Toolbox => engines,
            TrimBackend::Native => engines.with_native_trimming(),
        })
    }

    /// Validate the job and assemble its pipeline
    pub fn orchestrator(&self) -> Result<PipelineOrchestrator, ShorelineCliError> {
        self.validate()?;

        let mut builder = PipelineOrchestrator::builder()
            .project(self.project.clone())
            .input_root(&self.input.root)
            .engines(self.engines()?)
            .timeouts(self.stage_timeouts())
            .minimum_segment_length(self.run.minimum_segment_length);
        if let Some(workers) = self.run.workers {
            builder = builder.workers(workers);
        }
        Ok(builder.build()?)
    }
}
