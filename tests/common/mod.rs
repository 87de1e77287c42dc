//! Shared fixtures for integration tests: in-memory collaborators and a
//! config rooted in a temporary directory.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use ndarray::{Array2, Array4};
use tempfile::TempDir;

use scampr_nowcast::adapters::{
    AcquisitionError, AcquisitionGateway, DistributionSink, ForecastEngine, ForecastRequest,
    PreviewRenderer, RasterReader,
};
use scampr_nowcast::config::{ConfigFile, RunConfig, RunContext};
use scampr_nowcast::domain::{
    ArtifactKind, ArtifactLayout, ArtifactRef, Georeference, Raster, Timestamp,
};
use scampr_nowcast::Orchestrator;

pub const ROWS: usize = 3;
pub const COLS: usize = 4;

pub fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

pub fn georef() -> Georeference {
    Georeference {
        projection: "EPSG:4326".to_string(),
        left: 95.0,
        bottom: -11.0,
        right: 141.0,
        top: 6.0,
        yorigin: "upper".to_string(),
    }
}

/// Write a placeholder raster for `timestamp` at its canonical path
pub fn put_raster(layout: &ArtifactLayout, timestamp: Timestamp) {
    let raster = layout.raster(timestamp);
    std::fs::create_dir_all(raster.path.parent().unwrap()).unwrap();
    std::fs::write(&raster.path, b"raster").unwrap();
}

/// Gateway that "converts" by writing a placeholder raster, failing for a
/// configured set of timestamps
#[derive(Clone, Default)]
pub struct FakeGateway {
    pub failing: HashSet<Timestamp>,
    pub calls: Arc<Mutex<Vec<Timestamp>>>,
}

impl FakeGateway {
    pub fn failing(times: &[Timestamp]) -> Self {
        Self {
            failing: times.iter().copied().collect(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<Timestamp> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl AcquisitionGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn acquire(
        &self,
        layout: &ArtifactLayout,
        timestamp: Timestamp,
    ) -> Result<ArtifactRef, AcquisitionError> {
        self.calls.lock().unwrap().push(timestamp);
        if self.failing.contains(&timestamp) {
            return Err(AcquisitionError::NotFound(timestamp.datestring()));
        }
        put_raster(layout, timestamp);
        Ok(ArtifactRef {
            kind: ArtifactKind::Raster,
            domain: layout.domain_key(),
            timestamp,
            path: layout.raster(timestamp).path,
        })
    }
}

/// Reader returning a constant grid for any existing path
pub struct ConstantReader(pub f32);

#[async_trait]
impl RasterReader for ConstantReader {
    async fn read(&self, path: &Path) -> Result<Raster> {
        anyhow::ensure!(path.exists(), "no raster at {}", path.display());
        Ok(Raster {
            data: Array2::from_elem((ROWS, COLS), self.0),
            georef: georef(),
        })
    }
}

/// Engine returning a constant cube of the requested size
#[derive(Clone, Default)]
pub struct FakeEngine {
    pub value: f32,
    pub fail: bool,
    pub frames_seen: Arc<Mutex<Vec<usize>>>,
}

impl FakeEngine {
    pub fn constant(value: f32) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ForecastEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn forecast(&self, request: &ForecastRequest) -> Result<Array4<f32>> {
        let (frames, rows, cols) = request.stack.dim();
        self.frames_seen.lock().unwrap().push(frames);
        if self.fail {
            anyhow::bail!("engine diverged");
        }
        let shape = (request.params.n_ens_members, request.params.n_leadtimes, rows, cols);
        Ok(Array4::from_elem(shape, self.value))
    }
}

/// Renderer writing a placeholder image
pub struct FileRenderer;

#[async_trait]
impl PreviewRenderer for FileRenderer {
    async fn render(
        &self,
        _frame: &Array2<f32>,
        _georef: &Georeference,
        output: &Path,
    ) -> Result<()> {
        std::fs::write(output, b"png")?;
        Ok(())
    }
}

/// Sink that remembers remote names and always fails
#[derive(Clone, Default)]
pub struct UnreachableSink {
    pub attempts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DistributionSink for UnreachableSink {
    async fn send(&self, _local: &Path, remote_name: &str) -> Result<()> {
        self.attempts.lock().unwrap().push(remote_name.to_string());
        anyhow::bail!("connection refused")
    }
}

/// Config with all state under `temp`
pub fn config(temp: &TempDir, extra: &str) -> RunConfig {
    let yaml = format!(
        "domain: Indonesia\nprior_steps: 4\nmodel:\n  n_ens_members: 2\n  n_leadtimes: 3\n{}",
        extra
    );
    let file: ConfigFile = serde_yaml::from_str(&yaml).unwrap();
    RunConfig::resolve(file, temp.path(), Some(temp.path().join("state"))).unwrap()
}

pub fn context(config: RunConfig, time: Option<&str>) -> RunContext {
    RunContext::new(config, time.map(str::to_string))
}

pub fn orchestrator(gateway: FakeGateway, engine: FakeEngine) -> Orchestrator {
    Orchestrator::new(Box::new(gateway), Box::new(ConstantReader(1.5)))
        .with_engine(Box::new(engine))
}
