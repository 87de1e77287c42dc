//! Time window resolution.
//!
//! Picks the base time of a run and expands it into the N cadence steps
//! ending at it. Pure: the current time and the raw-latest pointer are
//! passed in, never looked up.

use std::path::PathBuf;

use crate::core::error::PipelineError;
use crate::domain::{RawLatest, RunMode, RunWindow, Timestamp};

/// Resolves the run window for a configured mode and step count
#[derive(Debug, Clone)]
pub struct WindowResolver {
    mode: RunMode,
    prior_steps: u32,

    /// Where the raw-latest pointer lives, for error reporting
    raw_latest_path: PathBuf,
}

impl WindowResolver {
    pub fn new(
        mode: RunMode,
        prior_steps: u32,
        raw_latest_path: PathBuf,
    ) -> Result<Self, PipelineError> {
        if prior_steps == 0 {
            return Err(PipelineError::invalid_config("prior_steps must be at least 1"));
        }
        Ok(Self {
            mode,
            prior_steps,
            raw_latest_path,
        })
    }

    /// Choose the base time.
    ///
    /// An explicit time wins in both modes. Without one, `auto` follows the
    /// raw-latest pointer and `manual` uses `now` truncated to the grid.
    pub fn base_time(
        &self,
        requested: Option<&str>,
        now: Timestamp,
        raw_latest: Option<&RawLatest>,
    ) -> Result<Timestamp, PipelineError> {
        if let Some(time) = requested {
            return Ok(Timestamp::parse(time)?);
        }

        match self.mode {
            RunMode::Auto => raw_latest
                .map(|pointer| pointer.time_coverage_start)
                .ok_or_else(|| PipelineError::NoPriorState {
                    path: self.raw_latest_path.clone(),
                }),
            RunMode::Manual => Ok(now),
        }
    }

    /// Resolve the full window, oldest first
    pub fn resolve(
        &self,
        requested: Option<&str>,
        now: Timestamp,
        raw_latest: Option<&RawLatest>,
    ) -> Result<RunWindow, PipelineError> {
        let base_time = self.base_time(requested, now, raw_latest)?;
        Ok(window_ending_at(base_time, self.prior_steps))
    }
}

/// The `steps` cadence steps ending at `base_time`, ascending
pub fn window_ending_at(base_time: Timestamp, steps: u32) -> RunWindow {
    let timestamps = (0..steps).rev().map(|i| base_time.minus_steps(i)).collect();
    RunWindow {
        base_time,
        timestamps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CADENCE_MINUTES;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn resolver(mode: RunMode, n: u32) -> WindowResolver {
        WindowResolver::new(mode, n, PathBuf::from("/state/raw_latest.json")).unwrap()
    }

    fn pointer(time: &str) -> RawLatest {
        RawLatest {
            latest_filename: "SCaMPR_x.nc".to_string(),
            file_path: PathBuf::from("/nc/SCaMPR_x.nc"),
            time_coverage_start: ts(time),
        }
    }

    #[test]
    fn test_window_is_ascending_at_cadence() {
        for n in 1..=8 {
            let window = window_ending_at(ts("202501151230"), n);
            assert_eq!(window.len(), n as usize);
            assert_eq!(*window.timestamps.last().unwrap(), ts("202501151230"));
            for pair in window.timestamps.windows(2) {
                assert_eq!(pair[1].minutes_since(&pair[0]), CADENCE_MINUTES);
            }
        }
    }

    #[test]
    fn test_explicit_time_wins_in_both_modes() {
        let now = ts("202501160000");
        for mode in [RunMode::Auto, RunMode::Manual] {
            let window = resolver(mode, 3).resolve(Some("202501151230"), now, None).unwrap();
            assert_eq!(
                window.timestamps,
                vec![ts("202501151210"), ts("202501151220"), ts("202501151230")]
            );
        }
    }

    #[test]
    fn test_auto_follows_raw_latest() {
        let window = resolver(RunMode::Auto, 2)
            .resolve(None, ts("202501160000"), Some(&pointer("202501151230")))
            .unwrap();
        assert_eq!(window.base_time, ts("202501151230"));
    }

    #[test]
    fn test_auto_without_pointer_is_no_prior_state() {
        let err = resolver(RunMode::Auto, 2)
            .resolve(None, ts("202501160000"), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoPriorState { .. }));
    }

    #[test]
    fn test_manual_uses_now() {
        let window = resolver(RunMode::Manual, 1)
            .resolve(None, ts("202501160010"), Some(&pointer("202501151230")))
            .unwrap();
        assert_eq!(window.timestamps, vec![ts("202501160010")]);
    }

    #[test]
    fn test_bad_time_is_invalid_time_format() {
        let r = resolver(RunMode::Manual, 2);
        for bad in ["2025-01-15", "202501151235", "202513011200"] {
            let err = r.resolve(Some(bad), ts("202501160000"), None).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidTimeFormat(_)), "{}", bad);
        }
    }

    #[test]
    fn test_zero_steps_rejected() {
        let err = WindowResolver::new(RunMode::Auto, 0, PathBuf::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }
}
