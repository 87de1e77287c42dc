//! Acquisition gateway backed by a fetch command and a convert command.
//!
//! The fetch command pulls the raw satellite field for one time step from
//! object storage; the convert command clips it to the domain and writes the
//! raster. Both are skipped when their output already exists and is large
//! enough to be trusted.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use super::command::{vars, CommandError, CommandSpec};
use super::AcquisitionGateway;
use crate::config::AcquisitionSettings;
use crate::domain::{ArtifactLayout, ArtifactRef, Timestamp};

/// Exit code a fetch command uses to say "no object for this time"
pub const FETCH_NOT_FOUND_EXIT_CODE: i32 = 2;

/// Why a single time step could not be acquired
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    /// The source has no data for this time step
    #[error("Not found: {0}")]
    NotFound(String),

    /// Fetch or conversion failed in a way that may succeed on a later run
    #[error("Transient IO failure: {0}")]
    TransientIo(String),
}

/// Gateway that shells out to configured fetch/convert programs.
///
/// Placeholders available to both commands: `{datestring}`, `{time}`,
/// `{domain}`, `{raw_path}`, `{raster_path}`, `{raw_dir}`, `{raster_dir}`.
pub struct CommandGateway {
    fetch: Option<CommandSpec>,
    convert: Option<CommandSpec>,
    min_valid_bytes: u64,
    raw_min_valid_bytes: u64,
}

impl CommandGateway {
    pub fn new(fetch: Option<CommandSpec>, convert: Option<CommandSpec>) -> Self {
        Self {
            fetch,
            convert,
            min_valid_bytes: 1,
            raw_min_valid_bytes: 1,
        }
    }

    pub fn from_settings(settings: &AcquisitionSettings) -> Self {
        Self::new(settings.fetch.clone(), settings.convert.clone())
            .with_thresholds(settings.min_valid_bytes, settings.raw_min_valid_bytes)
    }

    /// Minimum sizes (raster, raw) below which an existing file is re-acquired
    pub fn with_thresholds(mut self, raster_bytes: u64, raw_bytes: u64) -> Self {
        self.min_valid_bytes = raster_bytes;
        self.raw_min_valid_bytes = raw_bytes;
        self
    }

    async fn fetch_raw(
        &self,
        raw: &ArtifactRef,
        placeholders: &[(String, String)],
    ) -> Result<(), AcquisitionError> {
        if is_valid(&raw.path, self.raw_min_valid_bytes).await {
            debug!(path = %raw.path.display(), "Raw field already present, skipping fetch");
            return Ok(());
        }
        if raw.path.exists() {
            info!(
                path = %raw.path.display(),
                min_bytes = self.raw_min_valid_bytes,
                "Raw field below size threshold, re-fetching"
            );
        }

        let fetch = self.fetch.as_ref().ok_or_else(|| {
            AcquisitionError::NotFound(format!(
                "{} is missing and no fetch command is configured",
                raw.path.display()
            ))
        })?;

        ensure_parent(&raw.path).await?;
        fetch.run(placeholders).await.map_err(classify_fetch_error)?;

        if !is_valid(&raw.path, self.raw_min_valid_bytes).await {
            return Err(AcquisitionError::TransientIo(format!(
                "fetch finished but {} is missing or truncated",
                raw.path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AcquisitionGateway for CommandGateway {
    fn name(&self) -> &str {
        "command"
    }

    async fn acquire(
        &self,
        layout: &ArtifactLayout,
        timestamp: Timestamp,
    ) -> Result<ArtifactRef, AcquisitionError> {
        let raster = layout.raster(timestamp);
        if is_valid(&raster.path, self.min_valid_bytes).await {
            debug!(path = %raster.path.display(), "Raster already present");
            return Ok(raster);
        }

        let raw = layout.raw(timestamp);
        let placeholders = vars(&[
            ("datestring", timestamp.datestring()),
            ("time", timestamp.compact()),
            ("domain", layout.domain_key()),
            ("raw_path", raw.path.display().to_string()),
            ("raster_path", raster.path.display().to_string()),
            ("raw_dir", parent_display(&raw.path)),
            ("raster_dir", parent_display(&raster.path)),
        ]);

        self.fetch_raw(&raw, &placeholders).await?;

        let convert = self.convert.as_ref().ok_or_else(|| {
            AcquisitionError::NotFound(format!(
                "{} is missing and no convert command is configured",
                raster.path.display()
            ))
        })?;

        ensure_parent(&raster.path).await?;
        if let Err(e) = convert.run(&placeholders).await {
            discard_partial(&raster.path).await;
            return Err(AcquisitionError::TransientIo(format!("conversion failed: {}", e)));
        }

        if !is_valid(&raster.path, self.min_valid_bytes).await {
            warn!(path = %raster.path.display(), "Converter did not produce a valid raster");
            discard_partial(&raster.path).await;
            return Err(AcquisitionError::TransientIo(format!(
                "conversion finished but {} is missing or truncated",
                raster.path.display()
            )));
        }

        info!(%timestamp, path = %raster.path.display(), "Raster acquired");
        Ok(raster)
    }
}

fn classify_fetch_error(err: CommandError) -> AcquisitionError {
    match err.exit_code() {
        Some(FETCH_NOT_FOUND_EXIT_CODE) => AcquisitionError::NotFound(err.to_string()),
        _ => AcquisitionError::TransientIo(err.to_string()),
    }
}

async fn is_valid(path: &Path, min_bytes: u64) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() >= min_bytes)
        .unwrap_or(false)
}

/// Remove whatever a failed conversion left at the canonical path
async fn discard_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial raster"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial raster"),
    }
}

async fn ensure_parent(path: &Path) -> Result<(), AcquisitionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            AcquisitionError::TransientIo(format!(
                "cannot create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn parent_display(path: &Path) -> String {
    path.parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}
