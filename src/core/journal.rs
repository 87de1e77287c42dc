//! Append-only run journal with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) under
//! `<state_dir>/runs/<run_id>/events.jsonl`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Event, EventType};

const REPORT_FILE: &str = "report.json";

/// File-based journal for one run
pub struct RunJournal {
    run_dir: PathBuf,
    events_path: PathBuf,
}

impl RunJournal {
    /// Create or open the journal for a run under `runs_dir`
    pub async fn open(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = runs_dir.join(run_id.to_string());
        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");
        Ok(Self {
            run_dir,
            events_path,
        })
    }

    /// Where the final run report is saved
    pub fn report_path(&self) -> PathBuf {
        self.run_dir.join(REPORT_FILE)
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!("Failed to open events file: {}", self.events_path.display())
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Append, logging instead of failing. The journal never decides a run's outcome.
    pub async fn record(&self, event: Event) {
        if let Err(e) = self.append(&event).await {
            warn!(error = %e, event_type = ?event.event_type, "Failed to append journal event");
        }
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| {
                format!("Failed to open events file: {}", self.events_path.display())
            })?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Get the last event of a specific type
    pub async fn last_event_of_type(&self, event_type: EventType) -> Result<Option<Event>> {
        let events = self.replay().await?;
        Ok(events.into_iter().rev().find(|e| e.event_type == event_type))
    }

    /// List all run IDs under `runs_dir`
    pub async fn list_runs(runs_dir: &Path) -> Result<Vec<Uuid>> {
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(runs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = Uuid::parse_str(name) {
                    runs.push(id);
                }
            }
        }

        Ok(runs)
    }
}

/// Report file of a run under `runs_dir`
pub fn report_path(runs_dir: &Path, run_id: Uuid) -> PathBuf {
    runs_dir.join(run_id.to_string()).join(REPORT_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let journal = RunJournal::open(temp.path(), run_id).await.unwrap();

        let step = Timestamp::parse("202501151230").unwrap();
        journal
            .append(&Event::new(run_id, EventType::RunStarted, "indonesia"))
            .await
            .unwrap();
        journal
            .append(
                &Event::new(run_id, EventType::StepFailed, "fetch")
                    .with_step(step)
                    .with_error("404"),
            )
            .await
            .unwrap();

        let events = journal.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].step_time, Some(step));
        assert_eq!(events[1].error.as_deref(), Some("404"));

        let last = journal.last_event_of_type(EventType::RunStarted).await.unwrap();
        assert!(last.is_some());
    }

    #[tokio::test]
    async fn test_list_runs_skips_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        RunJournal::open(temp.path(), run_id).await.unwrap();
        std::fs::create_dir(temp.path().join("not-a-run")).unwrap();

        let runs = RunJournal::list_runs(temp.path()).await.unwrap();
        assert_eq!(runs, vec![run_id]);
        assert_eq!(
            report_path(temp.path(), run_id),
            temp.path().join(run_id.to_string()).join("report.json")
        );
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let journal = RunJournal::open(temp.path(), Uuid::new_v4()).await.unwrap();
        assert!(journal.replay().await.unwrap().is_empty());
    }
}
