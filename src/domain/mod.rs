//! Domain types for the nowcast orchestrator.
//!
//! This module contains the core data structures:
//! - Timestamp: instants on the 10-minute cadence grid
//! - Artifact: path-addressed data products and their naming
//! - Ensemble: input rasters, the ensemble cube and its summaries
//! - Pointer: "latest artifact" handoff documents
//! - Run: run mode, window, usable series, run report
//! - Events: run journal entries

pub mod artifact;
pub mod ensemble;
pub mod events;
pub mod pointer;
pub mod run;
pub mod timestamp;

// Re-export commonly used types
pub use artifact::{render_template, ArtifactKind, ArtifactLayout, ArtifactRef};
pub use ensemble::{EnsembleCube, EnsembleSummary, Georeference, Raster, SummaryField};
pub use events::{Event, EventType};
pub use pointer::{
    HandoffDocument, Legend, NowcastLatest, OverlayBounds, PngLatest, RawLatest, TifFileList,
};
pub use run::{RunMode, RunReport, RunState, RunWindow, UsableSeries};
pub use timestamp::{Timestamp, TimestampError, CADENCE_MINUTES};
