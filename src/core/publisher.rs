//! State publication: atomic replacement of handoff documents.
//!
//! A document is serialized fully in memory, written to a temporary file in
//! the destination directory, synced, then renamed over the target. Readers
//! see either the previous document or the new one, never a partial write.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::core::error::PipelineError;
use crate::domain::HandoffDocument;

/// Publish a handoff document at `path`
pub async fn publish<T: HandoffDocument>(path: &Path, document: &T) -> Result<(), PipelineError> {
    let failed = |reason: String| PipelineError::PublicationFailed {
        label: T::LABEL.to_string(),
        path: path.to_path_buf(),
        reason,
    };

    let bytes = serde_json::to_vec_pretty(document).map_err(|e| failed(e.to_string()))?;
    write_atomic(path, bytes).await.map_err(|e| failed(e.to_string()))?;

    info!(document = T::LABEL, path = %path.display(), "Published");
    Ok(())
}

/// Read a handoff document. Missing or unreadable documents yield `None`.
pub async fn read_pointer<T: HandoffDocument>(path: &Path) -> Option<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(
                document = T::LABEL,
                path = %path.display(),
                error = %e,
                "Failed to read handoff document"
            );
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(
                document = T::LABEL,
                path = %path.display(),
                error = %e,
                "Ignoring malformed handoff document"
            );
            None
        }
    }
}

/// Write `bytes` to `path` through a synced temporary file and a rename
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> io::Result<()> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
