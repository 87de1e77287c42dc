//! Numeric payloads: input rasters, the ensemble cube and its summaries.

use ndarray::{Array2, Array3, Array4};
use serde::{Deserialize, Serialize};

use super::timestamp::{Timestamp, CADENCE_MINUTES};

/// Georeferencing of a north-up grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Georeference {
    /// PROJ string or EPSG code of the grid
    pub projection: String,

    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,

    /// Row order of the data ("upper" = first row is northernmost)
    #[serde(default = "default_yorigin")]
    pub yorigin: String,
}

fn default_yorigin() -> String {
    "upper".to_string()
}

impl Georeference {
    /// Pixel size (x, y) for a grid of the given shape
    pub fn pixel_size(&self, rows: usize, cols: usize) -> (f64, f64) {
        let dx = (self.right - self.left) / cols.max(1) as f64;
        let dy = (self.top - self.bottom) / rows.max(1) as f64;
        (dx, dy)
    }

    /// Longitude of each column, west to east
    pub fn lons(&self, cols: usize) -> Vec<f64> {
        linspace(round1(self.left), round1(self.right), cols)
    }

    /// Latitude of each row, north to south
    pub fn lats(&self, rows: usize) -> Vec<f64> {
        linspace(round1(self.top), round1(self.bottom), rows)
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// One rain-rate grid read from a raster artifact
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: Array2<f32>,
    pub georef: Georeference,
}

/// Ensemble forecast indexed by (member, time, lat, lon).
///
/// The member axis carries no ordering. Forecast time `i` (0-based) is valid
/// at `base_time + (i + 1) * timestep`.
#[derive(Debug, Clone)]
pub struct EnsembleCube {
    pub data: Array4<f32>,
    pub base_time: Timestamp,
    pub timestep_minutes: i64,
    pub georef: Georeference,
}

impl EnsembleCube {
    pub fn members(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn n_times(&self) -> usize {
        self.data.shape()[1]
    }

    /// Lead time of each forecast step, in minutes
    pub fn leadtimes(&self) -> Vec<i64> {
        (1..=self.n_times() as i64)
            .map(|i| i * self.timestep_minutes)
            .collect()
    }

    /// Valid time of each forecast step
    pub fn forecast_times(&self) -> Vec<Timestamp> {
        let steps_per_frame = (self.timestep_minutes / CADENCE_MINUTES).max(1) as u32;
        (1..=self.n_times() as u32)
            .map(|i| self.base_time.plus_steps(i * steps_per_frame))
            .collect()
    }
}

/// A derived (time, lat, lon) statistic
#[derive(Debug, Clone)]
pub struct SummaryField {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub data: Array3<f32>,
}

/// Mean and exceedance probability of one ensemble, with the coordinates
/// inherited from its cube
#[derive(Debug, Clone)]
pub struct EnsembleSummary {
    pub mean: SummaryField,
    pub exceedance: SummaryField,
    pub threshold: f32,
    pub members: usize,
    pub base_time: Timestamp,
    pub times: Vec<Timestamp>,
    pub leadtimes: Vec<i64>,
    pub georef: Georeference,
}
