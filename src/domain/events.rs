//! Journal events recorded during a pipeline run.
//!
//! The journal is an append-only record of what a run did. It is never read
//! back to drive control flow; it exists for operators and post-mortems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp::Timestamp;

/// A single entry in a run journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Type of event
    pub event_type: EventType,

    /// Time step this event concerns (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_time: Option<Timestamp>,

    /// Human-readable summary
    pub payload_summary: String,

    /// Time taken in milliseconds (for completed stages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(run_id: Uuid, event_type: EventType, payload_summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            event_type,
            step_time: None,
            payload_summary: payload_summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_step(mut self, step_time: Timestamp) -> Self {
        self.step_time = Some(step_time);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events recorded in a run journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    WindowResolved,

    /// A missing step was acquired
    StepAcquired,

    /// A missing step could not be acquired and was dropped
    StepFailed,

    SeriesValidated,
    ForecastCompleted,

    /// A handoff document was replaced
    Published,

    RunCompleted,
    RunFailed,
}
