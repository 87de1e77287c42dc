//! Nowcast engine reached through a subprocess.
//!
//! The engine (optical-flow motion estimation plus stochastic extrapolation)
//! lives in an external numerical library. This adapter writes the input
//! stack and a JSON request into a scratch directory, runs the configured
//! command, and reads the ensemble back.

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ndarray::Ix4;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::command::{vars, CommandSpec};
use super::grid::{self, GridHeader};
use super::raster::RAIN_RATE_VARIABLE;
use super::{ForecastEngine, ForecastRequest};
use crate::domain::{Georeference, Timestamp};

/// Parameters passed to the engine alongside the input stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastParams {
    pub method: String,
    pub n_input_frames: usize,
    pub n_leadtimes: usize,
    pub n_ens_members: usize,
    pub km_per_pixel: f64,
    pub timestep_minutes: i64,
    pub precip_thr: f64,

    /// Bound on motion-field magnitude, applied by the engine after motion
    /// estimation (non-finite vectors are zeroed)
    pub max_velocity: f64,

    pub seed: u64,
}

/// JSON request document written for the engine command
#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    params: &'a ForecastParams,
    base_time: Timestamp,
    georef: &'a Georeference,
    input: String,
    output: String,
}

/// Engine adapter using subprocess mode.
///
/// Placeholders: `{request}`, `{input}`, `{output}`, `{workdir}`.
pub struct CommandEngine {
    command: CommandSpec,
}

impl CommandEngine {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ForecastEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.command.program
    }

    async fn forecast(&self, request: &ForecastRequest) -> Result<ndarray::Array4<f32>> {
        let scratch = tempfile::tempdir().context("Failed to create engine scratch directory")?;
        let input_path = scratch.path().join("input.grid");
        let output_path = scratch.path().join("output.grid");
        let request_path = scratch.path().join("request.json");

        let header = GridHeader::new(request.stack.shape(), &[RAIN_RATE_VARIABLE])
            .with_georef(request.georef.clone())
            .with_attr("base_time", request.base_time.datestring().into());
        grid::write(&input_path, &header, &[request.stack.view().into_dyn()])
            .await
            .context("Failed to write engine input stack")?;

        let doc = EngineRequest {
            params: &request.params,
            base_time: request.base_time,
            georef: &request.georef,
            input: input_path.display().to_string(),
            output: output_path.display().to_string(),
        };
        let json = serde_json::to_vec_pretty(&doc).context("Failed to serialize engine request")?;
        tokio::fs::write(&request_path, json)
            .await
            .context("Failed to write engine request")?;

        let started = Instant::now();
        debug!(
            program = %self.command.program,
            frames = request.stack.shape()[0],
            "Invoking nowcast engine"
        );
        self.command
            .run(&vars(&[
                ("request", request_path.display().to_string()),
                ("input", input_path.display().to_string()),
                ("output", output_path.display().to_string()),
                ("workdir", scratch.path().display().to_string()),
            ]))
            .await
            .context("Nowcast engine command failed")?;

        let file = grid::read(&output_path)
            .await
            .context("Failed to read engine output")?;
        let block = file
            .variable(RAIN_RATE_VARIABLE)
            .or_else(|| file.blocks.first())
            .context("Engine output holds no variables")?;
        let cube = block
            .clone()
            .into_dimensionality::<Ix4>()
            .context("Engine output is not (member, time, lat, lon)")?;

        info!(
            shape = ?cube.shape(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Nowcast engine finished"
        );
        Ok(cube)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn request() -> ForecastRequest {
        ForecastRequest {
            stack: Array3::ones((3, 2, 2)),
            params: ForecastParams {
                method: "steps".to_string(),
                n_input_frames: 3,
                n_leadtimes: 2,
                n_ens_members: 2,
                km_per_pixel: 2.0,
                timestep_minutes: 10,
                precip_thr: -10.0,
                max_velocity: 100.0,
                seed: 42,
            },
            base_time: Timestamp::parse("202501151230").unwrap(),
            georef: Georeference {
                projection: "EPSG:4326".to_string(),
                left: 0.0,
                bottom: 0.0,
                right: 1.0,
                top: 1.0,
                yorigin: "upper".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_engine_failure_is_surfaced() {
        let engine = CommandEngine::new(CommandSpec::new("sh", &["-c", "echo boom >&2; exit 1"]));
        let err = engine.forecast(&request()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
    }

    #[tokio::test]
    async fn test_engine_writes_request_document() {
        // Fails on purpose after checking the request exists and names the input
        let engine = CommandEngine::new(CommandSpec::new(
            "sh",
            &["-c", "grep -q input.grid {request} && test -s {input} && exit 3"],
        ));
        let err = engine.forecast(&request()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("exited with code 3"));
    }

    #[tokio::test]
    async fn test_missing_output_is_an_error() {
        let engine = CommandEngine::new(CommandSpec::new("true", &[]));
        assert!(engine.forecast(&request()).await.is_err());
    }
}
