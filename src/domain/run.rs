//! Run-scoped types: run mode, window, usable series and the run report.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::ArtifactRef;
use super::timestamp::Timestamp;

/// How the base time of a run is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Follow the raw-latest pointer unless a time is given
    Auto,

    /// Use the wall clock unless a time is given
    Manual,
}

impl Default for RunMode {
    fn default() -> Self {
        Self::Auto
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(format!(
                "invalid run_mode '{}': must be 'auto' or 'manual'",
                other
            )),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// Timestamps one run needs, oldest first, at cadence spacing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWindow {
    pub base_time: Timestamp,
    pub timestamps: Vec<Timestamp>,
}

impl RunWindow {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Raster artifacts available to feed the forecast, oldest first, at most
/// one per timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsableSeries(Vec<ArtifactRef>);

impl UsableSeries {
    /// Build from any collection of refs: sorts ascending and keeps the first
    /// ref seen for each timestamp
    pub fn from_refs(refs: impl IntoIterator<Item = ArtifactRef>) -> Self {
        let mut refs: Vec<ArtifactRef> = refs.into_iter().collect();
        refs.sort_by_key(|r| r.timestamp);
        refs.dedup_by_key(|r| r.timestamp);
        Self(refs)
    }

    pub fn refs(&self) -> &[ArtifactRef] {
        &self.0
    }

    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.0.iter().map(|r| r.timestamp).collect()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.0.iter().map(|r| r.path.clone()).collect()
    }

    pub fn last(&self) -> Option<&ArtifactRef> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing
    Running,

    /// Completed and published
    Completed,

    /// Completed and published, but some steps could not be acquired
    CompletedWithGaps { dropped: usize },

    /// Failed with error
    Failed { error: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}

/// Summary of a pipeline run, returned by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub domain: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Base time the window was built from
    pub requested_base_time: Option<Timestamp>,

    /// Newest input actually used
    pub effective_base_time: Option<Timestamp>,

    /// Timestamps that made it into the forecast input
    pub usable: Vec<Timestamp>,

    /// Timestamps dropped because acquisition failed
    pub dropped: Vec<Timestamp>,

    pub forecast_path: Option<PathBuf>,
    pub preview_count: usize,
}

impl RunReport {
    pub fn new(run_id: Uuid, domain: String) -> Self {
        Self {
            run_id,
            domain,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            requested_base_time: None,
            effective_base_time: None,
            usable: Vec::new(),
            dropped: Vec::new(),
            forecast_path: None,
            preview_count: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.state,
            RunState::Completed | RunState::CompletedWithGaps { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::ArtifactKind;

    fn raster(ts: &str, suffix: &str) -> ArtifactRef {
        ArtifactRef {
            kind: ArtifactKind::Raster,
            domain: "indonesia".to_string(),
            timestamp: Timestamp::parse(ts).unwrap(),
            path: PathBuf::from(format!("/tif/{}{}.tif", ts, suffix)),
        }
    }

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!("auto".parse::<RunMode>().unwrap(), RunMode::Auto);
        assert_eq!("manual".parse::<RunMode>().unwrap(), RunMode::Manual);
        assert!("hourly".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_usable_series_sorts_and_dedups() {
        let series = UsableSeries::from_refs(vec![
            raster("202501151250", ""),
            raster("202501151230", ""),
            raster("202501151250", "-dup"),
            raster("202501151240", ""),
        ]);

        let stamps: Vec<String> = series.timestamps().iter().map(|t| t.compact()).collect();
        assert_eq!(stamps, vec!["202501151230", "202501151240", "202501151250"]);
        assert_eq!(series.last().unwrap().path, PathBuf::from("/tif/202501151250.tif"));
    }

    #[test]
    fn test_report_success_states() {
        let mut report = RunReport::new(Uuid::new_v4(), "indonesia".to_string());
        assert!(!report.is_success());
        report.state = RunState::CompletedWithGaps { dropped: 1 };
        assert!(report.is_success());
    }
}
