//! Gap filling: acquire the rasters a window is missing.
//!
//! A failed step is dropped from the series, never fatal. The caller decides
//! later whether what is left is still a valid forecast input.

use std::collections::BTreeSet;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::adapters::{AcquisitionError, AcquisitionGateway};
use crate::core::availability::Availability;
use crate::domain::{ArtifactLayout, ArtifactRef, Timestamp, UsableSeries};

/// Outcome of one acquisition attempt
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub timestamp: Timestamp,
    pub result: Result<ArtifactRef, AcquisitionError>,
    pub duration_ms: u64,
}

/// Result of gap filling a window
#[derive(Debug, Clone, Default)]
pub struct GapFillReport {
    /// Present plus filled refs, ascending, one per timestamp
    pub usable: UsableSeries,
    pub filled: Vec<ArtifactRef>,
    pub failed: Vec<(Timestamp, AcquisitionError)>,

    /// Every attempt, in completion order
    pub attempts: Vec<StepOutcome>,
}

impl GapFillReport {
    pub fn failed_timestamps(&self) -> Vec<Timestamp> {
        self.failed.iter().map(|(ts, _)| *ts).collect()
    }

    pub fn has_gaps(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Runs acquisitions for missing steps with bounded concurrency
pub struct GapFillCoordinator<'a> {
    gateway: &'a dyn AcquisitionGateway,
    max_parallel: usize,
}

impl<'a> GapFillCoordinator<'a> {
    pub fn new(gateway: &'a dyn AcquisitionGateway, max_parallel: usize) -> Self {
        Self {
            gateway,
            max_parallel: max_parallel.max(1),
        }
    }

    pub async fn fill(
        &self,
        layout: &ArtifactLayout,
        availability: &Availability,
    ) -> GapFillReport {
        if availability.missing.is_empty() {
            return GapFillReport {
                usable: UsableSeries::from_refs(availability.present.iter().cloned()),
                ..Default::default()
            };
        }

        info!(
            gateway = self.gateway.name(),
            missing = availability.missing.len(),
            max_parallel = self.max_parallel,
            "Acquiring missing steps"
        );

        let gateway = self.gateway;
        let missing = availability.missing.iter().map(|r| r.timestamp);
        let attempts: Vec<StepOutcome> = stream::iter(missing)
            .map(|timestamp| async move {
                let started = Instant::now();
                let result = gateway.acquire(layout, timestamp).await;
                StepOutcome {
                    timestamp,
                    result,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;

        let mut filled = Vec::new();
        let mut failures = BTreeSet::new();
        let mut failed = Vec::new();
        for attempt in &attempts {
            match &attempt.result {
                Ok(artifact) => filled.push(artifact.clone()),
                Err(e) => {
                    warn!(timestamp = %attempt.timestamp, error = %e, "Step skipped");
                    failures.insert(attempt.timestamp);
                    failed.push((attempt.timestamp, e.clone()));
                }
            }
        }
        filled.sort_by_key(|r| r.timestamp);
        failed.sort_by_key(|(ts, _)| *ts);

        let usable = UsableSeries::from_refs(
            availability
                .present
                .iter()
                .chain(filled.iter())
                .filter(|r| !failures.contains(&r.timestamp))
                .cloned(),
        );

        info!(
            filled = filled.len(),
            failed = failed.len(),
            usable = usable.len(),
            "Gap fill finished"
        );
        GapFillReport {
            usable,
            filled,
            failed,
            attempts,
        }
    }
}
