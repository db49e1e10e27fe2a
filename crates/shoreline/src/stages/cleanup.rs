use std::sync::Arc;
use std::time::Duration;

use engines::driver::GeometryEngine;
use engines::TrimLineRequest;
use tracing::info;

use crate::blocking::call_blocking;
use crate::error::{PipelineError, Result};
use crate::types::{CleanupSummary, ShorelineVectorDataset, TrimSchedule, TrimState};

/// Removes short dangling lines, one pass per scheduled threshold.
///
/// Each pass edits the dataset in place, so later passes see the output of
/// earlier ones. A failed pass leaves the dataset at the last completed
/// threshold.
#[derive(Clone)]
pub struct DangleCleanupStage {
    engine: Arc<dyn GeometryEngine>,
    schedule: TrimSchedule,
    timeout: Option<Duration>,
}

impl DangleCleanupStage {
    pub fn new(engine: Arc<dyn GeometryEngine>) -> Self {
        Self {
            engine,
            schedule: TrimSchedule::default(),
            timeout: None,
        }
    }

    pub fn with_schedule(mut self, schedule: TrimSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Bound on each pass, not the whole schedule
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn schedule(&self) -> &TrimSchedule {
        &self.schedule
    }

    pub async fn run(&self, dataset: &ShorelineVectorDataset) -> Result<CleanupSummary> {
        let mut state = TrimState::Untrimmed;
        let mut passes = Vec::with_capacity(self.schedule.passes().len());

        for pass in self.schedule.passes() {
            let request = TrimLineRequest {
                features: dataset.path.clone(),
                dangle_length: pass.threshold,
                delete_shorts: pass.delete_short,
            };
            info!("Trimming dangles shorter than {}", pass.threshold);

            let engine = Arc::clone(&self.engine);
            let report = call_blocking(self.timeout, move |cancel| {
                engine.trim_line(&request, cancel)
            })
            .await
            .map_err(|cause| PipelineError::TrimFailed {
                threshold: pass.threshold,
                reached: state,
                cause,
            })?;

            if let (Some(removed), Some(remaining)) = (report.removed, report.remaining) {
                info!("{} removed, {} lines remain", removed, remaining);
            }
            state = TrimState::TrimmedAt(pass.threshold);
            passes.push((pass.threshold, report));
        }

        Ok(CleanupSummary { state, passes })
    }
}
