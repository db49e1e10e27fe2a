#[cfg(feature = "toolbox")]
pub mod toolbox;

#[cfg(feature = "native")]
pub mod native;

#[cfg(any(test, feature = "testing"))]
pub mod scripted;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::requests::{DetectionRequest, MosaicRequest, TraceRequest, TrimLineRequest, TrimReport};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Failed to initialize driver: {0}")]
    Initialization(String),
    #[error("Engine execution failed: {0}")]
    Execution(String),
    #[error("Engine rejected the input: {0}")]
    Rejected(String),
    #[error("Engine call was cancelled")]
    Cancelled,
}

/// Cooperative stop signal handed to every engine call.
///
/// The caller raises it when it stops waiting (a timeout); a driver running
/// an external process kills it and returns [`DriverError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The pixel-level shoreline classifier.
///
/// Every engine call is blocking; callers are expected to run it off the
/// async executor and raise `cancel` when they stop waiting for it.
pub trait ShorelineDetector: Send + Sync {
    /// Classify one raster and write its shoreline raster, returning its path
    fn detect(
        &self,
        request: &DetectionRequest,
        cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError>;
}

/// The raster merge engine
pub trait MosaicEngine: Send + Sync {
    /// Merge the listed rasters into one new raster, returning its path
    fn mosaic_to_new_raster(
        &self,
        request: &MosaicRequest,
        cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError>;
}

/// The raster-to-vector tracing engine
pub trait TracingEngine: Send + Sync {
    /// Trace non-background pixels into line features, returning the dataset path
    fn raster_to_polyline(
        &self,
        request: &TraceRequest,
        cancel: &Cancellation,
    ) -> Result<PathBuf, DriverError>;
}

/// The line geometry engine
pub trait GeometryEngine: Send + Sync {
    /// Trim dangling segments of a line dataset in place
    fn trim_line(
        &self,
        request: &TrimLineRequest,
        cancel: &Cancellation,
    ) -> Result<TrimReport, DriverError>;

    /// File extension the engine needs on the traced dataset, if any.
    ///
    /// `None` leaves the dataset as an extensionless feature class inside
    /// the project container.
    fn dataset_extension(&self) -> Option<&'static str> {
        None
    }
}
