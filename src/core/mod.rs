//! Core orchestration logic.
//!
//! This module contains:
//! - Window: base time and window resolution
//! - Availability: which window steps are already on disk
//! - GapFill: acquiring missing steps, recording failures
//! - Sequence: temporal contiguity checks before forecasting
//! - Forecast: engine invocation and the forecast artifact writer
//! - Ensemble: mean and exceedance probability
//! - Publisher: atomic handoff documents
//! - Preview: preview frames and the png-latest manifest
//! - Journal: append-only run events
//! - Orchestrator: main execution engine

pub mod availability;
pub mod ensemble;
pub mod error;
pub mod forecast;
pub mod gap_fill;
pub mod journal;
pub mod orchestrator;
pub mod preview;
pub mod publisher;
pub mod sequence;
pub mod window;

// Re-export commonly used types
pub use availability::{count_rasters, Availability, AvailabilityTracker};
pub use ensemble::{aggregate, EXCEEDANCE_VARIABLE, MEAN_VARIABLE};
pub use error::{ErrorClass, PipelineError};
pub use forecast::{write_forecast, ForecastInvoker};
pub use gap_fill::{GapFillCoordinator, GapFillReport, StepOutcome};
pub use journal::{report_path, RunJournal};
pub use orchestrator::Orchestrator;
pub use preview::{build_manifest, PreviewOutput, PreviewStage};
pub use publisher::{publish, read_pointer, write_atomic};
pub use sequence::{validate, ValidatedSeries};
pub use window::{window_ending_at, WindowResolver};
