//! Forecast invocation and the forecast artifact.
//!
//! The invoker turns a validated series into the engine's input stack,
//! calls the engine once and checks what comes back. The writer persists an
//! ensemble summary under its canonical path.

use std::path::Path;
use std::time::Instant;

use ndarray::{Array3, ArrayView2, Axis};
use serde_json::json;
use tracing::{info, instrument};

use crate::adapters::grid::{self, GridHeader};
use crate::adapters::{ForecastEngine, ForecastRequest, RasterReader};
use crate::config::ModelSettings;
use crate::core::error::PipelineError;
use crate::core::publisher::write_atomic;
use crate::core::sequence::ValidatedSeries;
use crate::domain::{EnsembleCube, EnsembleSummary, Georeference};

/// Calls the nowcast engine for one validated series
pub struct ForecastInvoker<'a> {
    reader: &'a dyn RasterReader,
    engine: &'a dyn ForecastEngine,
    model: &'a ModelSettings,
}

impl<'a> ForecastInvoker<'a> {
    pub fn new(
        reader: &'a dyn RasterReader,
        engine: &'a dyn ForecastEngine,
        model: &'a ModelSettings,
    ) -> Self {
        Self { reader, engine, model }
    }

    #[instrument(
        skip(self, validated),
        fields(engine = self.engine.name(), base_time = %validated.base_time)
    )]
    pub async fn invoke(&self, validated: &ValidatedSeries) -> Result<EnsembleCube, PipelineError> {
        let (stack, georef) = self.load_stack(validated).await?;
        let (frames, rows, cols) = stack.dim();

        let params = self.model.forecast_params(frames);
        let request = ForecastRequest {
            stack,
            params,
            base_time: validated.base_time,
            georef: georef.clone(),
        };

        let started = Instant::now();
        let data = self
            .engine
            .forecast(&request)
            .await
            .map_err(|e| PipelineError::Engine(format!("{:#}", e)))?;

        let expected = vec![self.model.n_ens_members, self.model.n_leadtimes, rows, cols];
        if data.shape() != expected.as_slice() {
            return Err(PipelineError::EngineContract {
                expected,
                actual: data.shape().to_vec(),
            });
        }

        info!(
            frames,
            members = self.model.n_ens_members,
            leadtimes = self.model.n_leadtimes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Forecast completed"
        );

        Ok(EnsembleCube {
            data,
            base_time: validated.base_time,
            timestep_minutes: self.model.timestep,
            georef,
        })
    }

    /// Read, check and stack the series oldest first, cleaning values as it goes
    async fn load_stack(
        &self,
        validated: &ValidatedSeries,
    ) -> Result<(Array3<f32>, Georeference), PipelineError> {
        let mut frames = Vec::with_capacity(validated.series.len());
        let mut georef = None;
        let mut expected_shape: Option<(usize, usize)> = None;

        for artifact in validated.series.refs() {
            let raster = self
                .reader
                .read(&artifact.path)
                .await
                .map_err(|e| PipelineError::RasterRead {
                    path: artifact.path.clone(),
                    reason: format!("{:#}", e),
                })?;

            let shape = raster.data.dim();
            match expected_shape {
                None => expected_shape = Some(shape),
                Some(expected) if expected != shape => {
                    return Err(PipelineError::InconsistentGrid {
                        path: artifact.path.clone(),
                        expected,
                        actual: shape,
                    });
                }
                Some(_) => {}
            }

            let mut data = raster.data;
            let (fill, lo, hi) = (
                self.model.fill_value,
                self.model.min_intensity,
                self.model.max_intensity,
            );
            data.mapv_inplace(|v| if v.is_finite() { v.clamp(lo, hi) } else { fill });
            frames.push(data);
            georef = Some(raster.georef);
        }

        let georef = georef.ok_or(PipelineError::NoUsableData)?;
        let views: Vec<ArrayView2<f32>> = frames.iter().map(|f| f.view()).collect();
        let stack =
            ndarray::stack(Axis(0), &views).map_err(|e| PipelineError::Engine(e.to_string()))?;
        Ok((stack, georef))
    }
}

/// Write the ensemble summary as a grid container holding both fields
pub async fn write_forecast(
    summary: &EnsembleSummary,
    method: &str,
    path: &Path,
) -> Result<(), PipelineError> {
    let failed = |reason: String| PipelineError::PublicationFailed {
        label: "forecast".to_string(),
        path: path.to_path_buf(),
        reason,
    };

    let (_, rows, cols) = summary.mean.data.dim();
    let fields = [&summary.mean, &summary.exceedance];
    let mut units = serde_json::Map::new();
    let mut long_names = serde_json::Map::new();
    for field in fields {
        units.insert(field.name.clone(), json!(field.units));
        long_names.insert(field.name.clone(), json!(field.long_name));
    }

    let header = GridHeader::new(
        summary.mean.data.shape(),
        &[summary.mean.name.as_str(), summary.exceedance.name.as_str()],
    )
    .with_georef(summary.georef.clone())
    .with_attr("dims", json!(["time", "lat", "lon"]))
    .with_attr("base_time", json!(summary.base_time.datestring()))
    .with_attr(
        "time",
        json!(summary.times.iter().map(|t| t.datestring()).collect::<Vec<_>>()),
    )
    .with_attr("leadtime", json!(summary.leadtimes))
    .with_attr("lat", json!(summary.georef.lats(rows)))
    .with_attr("lon", json!(summary.georef.lons(cols)))
    .with_attr("pixel_size", json!(summary.georef.pixel_size(rows, cols)))
    .with_attr("method", json!(method))
    .with_attr("members", json!(summary.members))
    .with_attr("threshold", json!(summary.threshold))
    .with_attr("units", units.into())
    .with_attr("long_name", long_names.into())
    .with_attr(
        "description",
        json!("Processed output from nowcasting ensemble, transformed back to rain rate (mm/h)."),
    );

    let bytes = grid::encode(
        &header,
        &[
            summary.mean.data.view().into_dyn(),
            summary.exceedance.data.view().into_dyn(),
        ],
    )
    .map_err(|e| failed(e.to_string()))?;

    write_atomic(path, bytes).await.map_err(|e| failed(e.to_string()))?;
    info!(path = %path.display(), "Forecast artifact written");
    Ok(())
}
