//! Grid container: the array exchange format shared with external tools.
//!
//! Layout: one line of JSON header, a `\n`, then one block per variable of
//! little-endian `f32` values in C (row-major) order. Every block has the
//! shape given in the header.

use std::path::Path;

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Georeference;

/// Header line of a grid container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
    pub shape: Vec<usize>,
    pub variables: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub georef: Option<Georeference>,

    /// Free-form attributes (coordinates, units, provenance)
    #[serde(default, flatten)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

impl GridHeader {
    pub fn new(shape: &[usize], variables: &[&str]) -> Self {
        Self {
            shape: shape.to_vec(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            georef: None,
            attrs: serde_json::Map::new(),
        }
    }

    pub fn with_georef(mut self, georef: Georeference) -> Self {
        self.georef = Some(georef);
        self
    }

    pub fn with_attr(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    fn block_len(&self) -> usize {
        self.shape.iter().product()
    }
}

/// A decoded grid container
#[derive(Debug, Clone)]
pub struct GridFile {
    pub header: GridHeader,
    pub blocks: Vec<ArrayD<f32>>,
}

impl GridFile {
    /// Block for a named variable
    pub fn variable(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.header
            .variables
            .iter()
            .position(|v| v == name)
            .and_then(|i| self.blocks.get(i))
    }
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Grid container has no header line")]
    MissingHeader,

    #[error("Invalid grid header: {0}")]
    Header(#[from] serde_json::Error),

    #[error("Grid body holds {actual} bytes, header implies {expected}")]
    Size { expected: usize, actual: usize },

    #[error("Block shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Serialize a header and its blocks
pub fn encode(header: &GridHeader, blocks: &[ArrayViewD<'_, f32>]) -> Result<Vec<u8>, GridError> {
    let expected = header.block_len();
    if blocks.len() != header.variables.len() {
        return Err(GridError::Size {
            expected: header.variables.len() * expected * 4,
            actual: blocks.len() * expected * 4,
        });
    }

    let mut bytes = serde_json::to_vec(header)?;
    bytes.push(b'\n');
    bytes.reserve(blocks.len() * expected * 4);

    for block in blocks {
        if block.shape() != header.shape.as_slice() {
            return Err(GridError::Size {
                expected: expected * 4,
                actual: block.len() * 4,
            });
        }
        for value in block.iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    Ok(bytes)
}

/// Parse a grid container from bytes
pub fn decode(bytes: &[u8]) -> Result<GridFile, GridError> {
    let split = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or(GridError::MissingHeader)?;

    let header: GridHeader = serde_json::from_slice(&bytes[..split])?;
    let body = &bytes[split + 1..];

    let block_len = header.block_len();
    let expected = block_len * 4 * header.variables.len();
    if body.len() != expected {
        return Err(GridError::Size {
            expected,
            actual: body.len(),
        });
    }

    let mut blocks = Vec::with_capacity(header.variables.len());
    if block_len == 0 {
        for _ in &header.variables {
            blocks.push(ArrayD::zeros(IxDyn(&header.shape)));
        }
    } else {
        for chunk in body.chunks_exact(block_len * 4) {
            let values: Vec<f32> = chunk
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            blocks.push(ArrayD::from_shape_vec(IxDyn(&header.shape), values)?);
        }
    }

    Ok(GridFile { header, blocks })
}

/// Read and decode a grid container from disk
pub async fn read(path: &Path) -> Result<GridFile, GridError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| GridError::Io {
        path: path.display().to_string(),
        source,
    })?;
    decode(&bytes)
}

/// Encode and write a grid container (plain write, for scratch files)
pub async fn write(
    path: &Path,
    header: &GridHeader,
    blocks: &[ArrayViewD<'_, f32>],
) -> Result<(), GridError> {
    let bytes = encode(header, blocks)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| GridError::Io {
            path: path.display().to_string(),
            source,
        })
}
