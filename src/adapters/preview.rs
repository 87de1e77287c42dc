//! Preview renderer driven by an external plotting command.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ndarray::Array2;
use tracing::debug;

use super::command::{vars, CommandSpec};
use super::grid::{self, GridHeader};
use super::raster::RAIN_RATE_VARIABLE;
use super::PreviewRenderer;
use crate::domain::Georeference;

/// Writes the frame to a scratch grid and runs the render command.
///
/// Placeholders: `{input}`, `{output}`.
pub struct CommandRenderer {
    command: CommandSpec,
}

impl CommandRenderer {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl PreviewRenderer for CommandRenderer {
    async fn render(
        &self,
        frame: &Array2<f32>,
        georef: &Georeference,
        output: &Path,
    ) -> Result<()> {
        let scratch = tempfile::tempdir().context("Failed to create render scratch directory")?;
        let input = scratch.path().join("frame.grid");

        let header =
            GridHeader::new(frame.shape(), &[RAIN_RATE_VARIABLE]).with_georef(georef.clone());
        grid::write(&input, &header, &[frame.view().into_dyn()])
            .await
            .context("Failed to write preview frame")?;

        debug!(output = %output.display(), "Rendering preview");
        self.command
            .run(&vars(&[
                ("input", input.display().to_string()),
                ("output", output.display().to_string()),
            ]))
            .await
            .with_context(|| format!("Preview render failed for {}", output.display()))?;

        Ok(())
    }
}
