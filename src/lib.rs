//! scampr-nowcast - orchestrator for a satellite rain-rate nowcast
//!
//! Decides which 10-minute steps a run needs, reconciles them with what is
//! on disk, acquires what is missing, checks the series is contiguous, hands
//! it to an external ensemble engine and publishes the results as small
//! "latest artifact" documents for downstream consumers.
//!
//! # Modules
//!
//! - `adapters`: External collaborators (acquisition, engine, renderer, distribution)
//! - `core`: Orchestration stages and the orchestrator
//! - `domain`: Data structures (Timestamp, ArtifactRef, EnsembleCube, handoff documents)
//! - `config`: YAML configuration and the per-run context
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a nowcast from the raw-latest pointer
//! scampr-nowcast run -c scampr.yaml
//!
//! # Re-run a specific base time
//! scampr-nowcast run -c scampr.yaml -t 202501151230
//!
//! # Inspect handoff state
//! scampr-nowcast status -c scampr.yaml
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use config::{RunConfig, RunContext};
pub use core::{Orchestrator, PipelineError};
pub use domain::{ArtifactLayout, ArtifactRef, RunReport, RunState, Timestamp};
