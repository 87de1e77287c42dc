//! Sequence validation of the usable series.

use tracing::{debug, warn};

use crate::core::error::PipelineError;
use crate::domain::{Timestamp, UsableSeries, CADENCE_MINUTES};

/// A series that passed validation, with the effective base time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSeries {
    pub series: UsableSeries,

    /// Timestamp of the newest usable step; may be earlier than requested
    pub base_time: Timestamp,
}

/// Check the series is non-empty and that its trailing `min(n - 1, len - 1)`
/// intervals are exactly one cadence step.
///
/// Earlier holes are tolerated: the engine only looks at the newest frames.
pub fn validate(series: UsableSeries, n: u32) -> Result<ValidatedSeries, PipelineError> {
    let timestamps = series.timestamps();
    let base_time = *timestamps.last().ok_or(PipelineError::NoUsableData)?;

    let checked = (n.saturating_sub(1) as usize).min(timestamps.len() - 1);
    let tail = &timestamps[timestamps.len() - 1 - checked..];
    for pair in tail.windows(2) {
        let gap = pair[1].minutes_since(&pair[0]);
        if gap != CADENCE_MINUTES {
            warn!(earlier = %pair[0], later = %pair[1], gap, "Sequence has a gap");
            return Err(PipelineError::DiscontinuousSequence {
                earlier: pair[0],
                later: pair[1],
                gap_minutes: gap,
                expected_minutes: CADENCE_MINUTES,
            });
        }
    }

    debug!(len = timestamps.len(), checked, %base_time, "Sequence validated");
    Ok(ValidatedSeries { series, base_time })
}
