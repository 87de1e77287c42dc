//! Distribution sink: ships a produced file to a downstream target.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::command::{vars, CommandSpec};
use super::DistributionSink;

/// Runs a send command per file.
///
/// Placeholders: `{local}`, `{remote}`.
pub struct CommandSink {
    command: CommandSpec,
}

impl CommandSink {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl DistributionSink for CommandSink {
    async fn send(&self, local: &Path, remote_name: &str) -> Result<()> {
        self.command
            .run(&vars(&[
                ("local", local.display().to_string()),
                ("remote", remote_name.to_string()),
            ]))
            .await
            .with_context(|| format!("Failed to distribute {}", local.display()))?;

        info!(file = %local.display(), remote = remote_name, "Distributed");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_send_passes_local_and_remote() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("a.json");
        std::fs::write(&local, "{}").unwrap();
        let dest = temp.path().join("dest");
        std::fs::create_dir(&dest).unwrap();

        let template = format!("cp {{local}} {}/{{remote}}", dest.display());
        let sink = CommandSink::new(CommandSpec::new("sh", &["-c", &template]));
        sink.send(&local, "latest.json").await.unwrap();

        assert!(dest.join("latest.json").exists());
    }

    #[tokio::test]
    async fn test_send_failure_is_error() {
        let sink = CommandSink::new(CommandSpec::new("false", &[]));
        assert!(sink.send(Path::new("/nonexistent"), "x").await.is_err());
    }
}
