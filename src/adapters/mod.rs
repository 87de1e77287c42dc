//! Adapter interfaces for external collaborators.
//!
//! The orchestrator never talks to object storage, format converters, the
//! nowcast engine, renderers or distribution targets directly. Each is a
//! trait here, with a subprocess-backed implementation driven by a
//! configured [`CommandSpec`].

pub mod acquisition;
pub mod command;
pub mod distribution;
pub mod engine;
pub mod grid;
pub mod preview;
pub mod raster;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use ndarray::{Array2, Array3, Array4};

use crate::domain::{ArtifactLayout, ArtifactRef, Georeference, Raster, Timestamp};

pub use acquisition::{AcquisitionError, CommandGateway};
pub use command::{CommandError, CommandSpec};
pub use distribution::CommandSink;
pub use engine::{CommandEngine, ForecastParams};
pub use preview::CommandRenderer;
pub use raster::GridFileReader;

/// Produces (or confirms) the converted raster for one time step.
///
/// Implementations must be idempotent: when a valid raster already exists
/// at the canonical path, `acquire` returns it without fetching anything.
#[async_trait]
pub trait AcquisitionGateway: Send + Sync {
    /// Human-readable gateway name
    fn name(&self) -> &str;

    /// Acquire the raster for `timestamp` in the layout's domain
    async fn acquire(
        &self,
        layout: &ArtifactLayout,
        timestamp: Timestamp,
    ) -> Result<ArtifactRef, AcquisitionError>;
}

/// Reads one raster artifact into memory
#[async_trait]
pub trait RasterReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Raster>;
}

/// Input handed to the nowcast engine
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    /// Rain-rate frames (time, lat, lon), oldest first
    pub stack: Array3<f32>,
    pub params: ForecastParams,
    pub base_time: Timestamp,
    pub georef: Georeference,
}

/// The external extrapolation/ensemble engine.
///
/// Returns the raw ensemble as (member, leadtime, lat, lon).
#[async_trait]
pub trait ForecastEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn forecast(&self, request: &ForecastRequest) -> Result<Array4<f32>>;
}

/// Renders one forecast frame to an image file
#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn render(&self, frame: &Array2<f32>, georef: &Georeference, output: &Path) -> Result<()>;
}

/// Ships produced files to downstream consumers, best effort
#[async_trait]
pub trait DistributionSink: Send + Sync {
    async fn send(&self, local: &Path, remote_name: &str) -> Result<()>;
}
