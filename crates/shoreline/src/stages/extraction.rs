use std::collections::hash_map::{Entry, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use engines::driver::ShorelineDetector;
use engines::DetectionRequest;
use futures::stream::{self, StreamExt};
use shoreline_common::utils;
use tracing::{info, warn};

use crate::blocking::{call_blocking, CallError};
use crate::types::{ExtractionOutcome, ExtractionResultSet, Raster};

/// Band selector of the green band handed to the detector
pub const GREEN_BAND: u8 = 2;
/// Band selector of the near-infrared band handed to the detector
pub const NIR_BAND: u8 = 4;

/// Per-raster shoreline detection with failure isolation
#[derive(Clone)]
pub struct ShorelineExtractionStage {
    detector: Arc<dyn ShorelineDetector>,
    workers: usize,
    timeout: Option<Duration>,
}

impl ShorelineExtractionStage {
    pub fn new(detector: Arc<dyn ShorelineDetector>) -> Self {
        Self {
            detector,
            workers: 1,
            timeout: None,
        }
    }

    /// Maximum number of concurrent detector calls (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn request_for(&self, raster: &Raster, output_dir: &Path) -> DetectionRequest {
        DetectionRequest {
            input: raster.path().to_path_buf(),
            output_location: output_dir.to_path_buf(),
            output_file: utils::shoreline_output_name(raster.base_name()),
            green_band: GREEN_BAND,
            nir_band: NIR_BAND,
        }
    }

    /// Run detection on every raster, writing into `output_dir`.
    ///
    /// Calls run concurrently up to the worker limit; outcomes come back in
    /// the order of `rasters` whatever order the calls finish in. A raster
    /// whose base name was already taken earlier in the list would write the
    /// same output; it fails without reaching the detector.
    pub async fn run(&self, rasters: &[Raster], output_dir: &Path) -> ExtractionResultSet {
        let total = rasters.len();
        let owners = output_owners(rasters);
        let outcomes = stream::iter(rasters.iter().zip(owners).enumerate())
            .map(|(index, (raster, owner))| {
                self.extract_one(index, total, raster, owner, output_dir)
            })
            .buffered(self.workers)
            .collect::<Vec<_>>()
            .await;

        ExtractionResultSet::new(outcomes)
    }

    async fn extract_one(
        &self,
        index: usize,
        total: usize,
        raster: &Raster,
        owner: Option<&Raster>,
        output_dir: &Path,
    ) -> ExtractionOutcome {
        let request = self.request_for(raster, output_dir);

        if let Some(owner) = owner {
            let cause = CallError::OutputClaimed {
                output: request.output_path(),
                claimed_by: owner.path().to_path_buf(),
            };
            warn!("Skipping {}: {}", raster.path().display(), cause);
            return ExtractionOutcome::Failure {
                raster_name: raster.base_name().to_string(),
                cause,
            };
        }

        let detector = Arc::clone(&self.detector);
        info!("Extracting shoreline {}/{}: {}", index + 1, total, raster.base_name());
        let outcome = call_blocking(self.timeout, move |cancel| {
            detector.detect(&request, cancel)
        })
        .await;
        match outcome {
            Ok(output) => ExtractionOutcome::Success {
                raster: raster.clone(),
                output,
            },
            Err(cause) => {
                warn!("Shoreline extraction failed for {}: {}", raster.base_name(), cause);
                ExtractionOutcome::Failure {
                    raster_name: raster.base_name().to_string(),
                    cause,
                }
            }
        }
    }
}

/// For each raster, the earlier raster already writing the same output
fn output_owners(rasters: &[Raster]) -> Vec<Option<&Raster>> {
    let mut owners: HashMap<&str, &Raster> = HashMap::new();
    rasters
        .iter()
        .map(|raster| match owners.entry(raster.base_name()) {
            Entry::Occupied(first) => Some(*first.get()),
            Entry::Vacant(slot) => {
                slot.insert(raster);
                None
            }
        })
        .collect()
}
