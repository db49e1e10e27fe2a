use std::fmt::Debug;
use std::path::PathBuf;

use crate::driver::DriverError;

/// Generic trait for engine inputs
/// Every driver validates its sources before handing them to an engine
pub trait Source: Debug + Clone {
    /// Type-specific validation that the source is readable
    fn validate(&self) -> Result<(), DriverError>;

    /// Get a human-readable description of this source
    fn description(&self) -> String;
}

/// Generic trait for engine outputs
pub trait Sink: Debug + Clone {
    /// Type-specific validation that the sink can be written to
    fn validate(&self) -> Result<(), DriverError>;

    /// Get a human-readable description of this sink
    fn description(&self) -> String;
}

/// A raster (or feature dataset) file read by an engine
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Source for FileSource {
    fn validate(&self) -> Result<(), DriverError> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(DriverError::Execution(format!(
                "Input not found: {}",
                self.path.display()
            )))
        }
    }

    fn description(&self) -> String {
        format!("File: {}", self.path.display())
    }
}

/// A file written by an engine into a folder that must already exist.
///
/// Output folders are created by the run that owns them, never by a driver.
#[derive(Debug, Clone)]
pub struct FileSink {
    pub path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Sink for FileSink {
    fn validate(&self) -> Result<(), DriverError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                Err(DriverError::Execution(format!(
                    "Output folder does not exist: {}",
                    parent.display()
                )))
            }
            _ => Ok(()),
        }
    }

    fn description(&self) -> String {
        format!("File: {}", self.path.display())
    }
}

/// A folder receiving a named output
#[derive(Debug, Clone)]
pub struct DirectorySink {
    pub path: PathBuf,
    pub file_name: String,
}

impl DirectorySink {
    pub fn new(path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
        }
    }

    /// Full path of the output inside the folder
    pub fn target(&self) -> PathBuf {
        self.path.join(&self.file_name)
    }
}

impl Sink for DirectorySink {
    fn validate(&self) -> Result<(), DriverError> {
        if !self.path.is_dir() {
            return Err(DriverError::Execution(format!(
                "Output folder does not exist: {}",
                self.path.display()
            )));
        }
        if self.file_name.is_empty() {
            return Err(DriverError::Execution("Output name is empty".to_string()));
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("Directory: {} (name: {})", self.path.display(), self.file_name)
    }
}
