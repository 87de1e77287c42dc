//! Pipeline error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{Timestamp, TimestampError};

/// Failures that end a run.
///
/// Per-step acquisition failures are not here: they are recovered by the
/// gap-fill stage and only show up as a shorter usable series.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid time: {0}")]
    InvalidTimeFormat(#[from] TimestampError),

    #[error("No prior state: raw-latest pointer {path} does not exist")]
    NoPriorState { path: PathBuf },

    #[error("No usable data: every step in the window is missing")]
    NoUsableData,

    #[error(
        "Discontinuous sequence: {earlier} -> {later} is {gap_minutes} min, \
         expected {expected_minutes}"
    )]
    DiscontinuousSequence {
        earlier: Timestamp,
        later: Timestamp,
        gap_minutes: i64,
        expected_minutes: i64,
    },

    #[error("Forecast ensemble has no members")]
    EmptyEnsemble,

    #[error("Raster {path} has shape {actual:?}, expected {expected:?}")]
    InconsistentGrid {
        path: PathBuf,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Failed to read raster {path}: {reason}")]
    RasterRead { path: PathBuf, reason: String },

    #[error("Nowcast engine failed: {0}")]
    Engine(String),

    #[error("Nowcast engine returned shape {actual:?}, expected {expected:?}")]
    EngineContract {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Failed to publish {label} at {path}: {reason}")]
    PublicationFailed {
        label: String,
        path: PathBuf,
        reason: String,
    },
}

/// Coarse class of a pipeline failure, used in logs and run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Sequence,
    Engine,
    Publication,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Sequence => "sequence",
            Self::Engine => "engine",
            Self::Publication => "publication",
        }
    }
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidConfiguration(_)
            | Self::InvalidTimeFormat(_)
            | Self::NoPriorState { .. } => ErrorClass::Configuration,
            Self::NoUsableData | Self::DiscontinuousSequence { .. } => ErrorClass::Sequence,
            Self::EmptyEnsemble
            | Self::InconsistentGrid { .. }
            | Self::RasterRead { .. }
            | Self::Engine(_)
            | Self::EngineContract { .. } => ErrorClass::Engine,
            Self::PublicationFailed { .. } => ErrorClass::Publication,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert_eq!(PipelineError::NoUsableData.class(), ErrorClass::Sequence);
        assert_eq!(
            PipelineError::invalid_config("bad").class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            PipelineError::Engine("x".into()).class().as_str(),
            "engine"
        );
    }

    #[test]
    fn test_time_error_converts() {
        let err: PipelineError = Timestamp::parse("nope").unwrap_err().into();
        assert!(matches!(err, PipelineError::InvalidTimeFormat(_)));
    }
}
