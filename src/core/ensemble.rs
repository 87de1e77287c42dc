//! Ensemble aggregation: reduce the member axis to summary fields.

use ndarray::Axis;
use tracing::debug;

use crate::core::error::PipelineError;
use crate::domain::{EnsembleCube, EnsembleSummary, SummaryField};

pub const MEAN_VARIABLE: &str = "mean_rr";
pub const EXCEEDANCE_VARIABLE: &str = "prob_exceed";

/// Mean rain rate and probability of reaching `threshold`, per (time, lat, lon).
///
/// Comparison is inclusive: a member exactly at the threshold counts.
pub fn aggregate(cube: &EnsembleCube, threshold: f32) -> Result<EnsembleSummary, PipelineError> {
    let members = cube.members();
    if members == 0 {
        return Err(PipelineError::EmptyEnsemble);
    }

    let mean = cube
        .data
        .mean_axis(Axis(0))
        .ok_or(PipelineError::EmptyEnsemble)?;

    let exceedance = cube
        .data
        .mapv(|v| if v >= threshold { 1.0f32 } else { 0.0 })
        .sum_axis(Axis(0))
        / members as f32;

    debug!(members, threshold, shape = ?mean.shape(), "Ensemble aggregated");

    Ok(EnsembleSummary {
        mean: SummaryField {
            name: MEAN_VARIABLE.to_string(),
            long_name: "Ensemble mean of rain rate".to_string(),
            units: "mm/h".to_string(),
            data: mean,
        },
        exceedance: SummaryField {
            name: EXCEEDANCE_VARIABLE.to_string(),
            long_name: format!("Probability of exceeding {}mm/h", threshold),
            units: "1".to_string(),
            data: exceedance,
        },
        threshold,
        members,
        base_time: cube.base_time,
        times: cube.forecast_times(),
        leadtimes: cube.leadtimes(),
        georef: cube.georef.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Georeference, Timestamp};
    use ndarray::Array4;

    fn cube(data: Array4<f32>) -> EnsembleCube {
        EnsembleCube {
            data,
            base_time: Timestamp::parse("202501151230").unwrap(),
            timestep_minutes: 10,
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

    #[test]
    fn test_mean_and_exceedance() {
        // 4 members, 1 time, 1x2 grid
        let data = Array4::from_shape_vec(
            (4, 1, 1, 2),
            vec![0.0, 2.0, 1.0, 2.0, 2.0, 2.0, 3.0, 2.0],
        )
        .unwrap();
        let summary = aggregate(&cube(data), 1.0).unwrap();

        assert_eq!(summary.mean.data[[0, 0, 0]], 1.5);
        assert_eq!(summary.mean.data[[0, 0, 1]], 2.0);
        // 0.0 misses, 1.0 hits (inclusive), 2.0 and 3.0 hit
        assert_eq!(summary.exceedance.data[[0, 0, 0]], 0.75);
        assert_eq!(summary.exceedance.data[[0, 0, 1]], 1.0);
        assert_eq!(summary.members, 4);
    }

    #[test]
    fn test_fields_keep_coordinates() {
        let summary = aggregate(&cube(Array4::ones((2, 3, 2, 2))), 1.0).unwrap();
        assert_eq!(summary.mean.data.shape(), &[3, 2, 2]);
        assert_eq!(summary.leadtimes, vec![10, 20, 30]);
        assert_eq!(summary.times[0], Timestamp::parse("202501151240").unwrap());
        for p in summary.exceedance.data.iter() {
            assert!((0.0..=1.0).contains(p));
        }
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        let err = aggregate(&cube(Array4::zeros((0, 2, 2, 2))), 1.0).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyEnsemble));
    }
}
