//! Raster reader for grid-container rasters.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ndarray::Ix2;

use super::grid;
use super::RasterReader;
use crate::domain::Raster;

/// Variable name converters write the rain rate under
pub const RAIN_RATE_VARIABLE: &str = "rr";

/// Reads a 2-D rain-rate grid plus georeference from a grid container.
///
/// Uses the `rr` variable when present, else the first variable.
#[derive(Debug, Default, Clone)]
pub struct GridFileReader;

impl GridFileReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RasterReader for GridFileReader {
    async fn read(&self, path: &Path) -> Result<Raster> {
        let file = grid::read(path)
            .await
            .with_context(|| format!("Failed to read raster: {}", path.display()))?;

        let georef = file
            .header
            .georef
            .clone()
            .with_context(|| format!("Raster {} carries no georeference", path.display()))?;

        let block = file
            .variable(RAIN_RATE_VARIABLE)
            .or_else(|| file.blocks.first())
            .with_context(|| format!("Raster {} holds no variables", path.display()))?;

        let data = block
            .clone()
            .into_dimensionality::<Ix2>()
            .with_context(|| format!("Raster {} is not two-dimensional", path.display()))?;

        Ok(Raster { data, georef })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::grid::GridHeader;
    use crate::domain::Georeference;
    use ndarray::arr2;
    use tempfile::TempDir;

    fn georef() -> Georeference {
        Georeference {
            projection: "EPSG:4326".to_string(),
            left: 100.0,
            bottom: -2.0,
            right: 102.0,
            top: 0.0,
            yorigin: "upper".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reads_rain_rate_variable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("r.tif");
        let rr = arr2(&[[0.0f32, 1.5], [2.5, 3.0]]).into_dyn();
        let header = GridHeader::new(&[2, 2], &["rr"]).with_georef(georef());
        grid::write(&path, &header, &[rr.view()]).await.unwrap();

        let raster = GridFileReader::new().read(&path).await.unwrap();
        assert_eq!(raster.data[[1, 0]], 2.5);
        assert_eq!(raster.georef, georef());
    }

    #[tokio::test]
    async fn test_requires_georeference() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("r.tif");
        let rr = arr2(&[[0.0f32]]).into_dyn();
        grid::write(&path, &GridHeader::new(&[1, 1], &["rr"]), &[rr.view()])
            .await
            .unwrap();

        assert!(GridFileReader::new().read(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_three_dimensional_block() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("r.tif");
        let cube = ndarray::Array3::<f32>::zeros((2, 2, 2)).into_dyn();
        let header = GridHeader::new(&[2, 2, 2], &["rr"]).with_georef(georef());
        grid::write(&path, &header, &[cube.view()]).await.unwrap();

        assert!(GridFileReader::new().read(&path).await.is_err());
    }
}
