//! Availability tracking: which window steps already have a raster on disk.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::{ArtifactLayout, ArtifactRef, RunWindow};

/// Partition of a window's raster refs into present and missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    /// One ref per window step, oldest first
    pub targets: Vec<ArtifactRef>,
    pub present: Vec<ArtifactRef>,
    pub missing: Vec<ArtifactRef>,
}

impl Availability {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Checks raster existence through an injectable predicate
pub struct AvailabilityTracker<F = Box<dyn Fn(&Path) -> bool + Send + Sync>> {
    exists: F,
}

impl AvailabilityTracker {
    /// Tracker backed by the filesystem. Files shorter than `min_valid_bytes`
    /// count as missing, matching what the gateway accepts.
    pub fn filesystem(min_valid_bytes: u64) -> Self {
        Self {
            exists: Box::new(move |path: &Path| {
                std::fs::metadata(path)
                    .map(|m| m.is_file() && m.len() >= min_valid_bytes)
                    .unwrap_or(false)
            }),
        }
    }
}

impl<F> AvailabilityTracker<F>
where
    F: Fn(&Path) -> bool,
{
    pub fn with_predicate(exists: F) -> Self {
        Self { exists }
    }

    pub fn check(&self, layout: &ArtifactLayout, window: &RunWindow) -> Availability {
        let targets: Vec<ArtifactRef> =
            window.timestamps.iter().map(|ts| layout.raster(*ts)).collect();
        let (present, missing): (Vec<_>, Vec<_>) = targets
            .iter()
            .cloned()
            .partition(|r| (self.exists)(&r.path));

        debug!(
            present = present.len(),
            missing = missing.len(),
            "Checked raster availability"
        );
        Availability {
            targets,
            present,
            missing,
        }
    }
}

/// Count raster artifacts on disk for the layout's domain
pub fn count_rasters(layout: &ArtifactLayout) -> Result<usize> {
    let pattern = layout.raster_pattern();
    let paths =
        glob::glob(&pattern).with_context(|| format!("Invalid raster pattern: {}", pattern))?;
    Ok(paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).count())
}
