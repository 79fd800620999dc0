//! Core types and error definitions for patch_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, PatchDatasetError>;

/// Milliseconds since the Unix epoch, 0 if the clock is before it.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum PatchDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed shard {path}: {msg}")]
    Shard { path: PathBuf, msg: String },
    #[error("hdf5 error at {path}: {msg}")]
    Hdf5 { path: PathBuf, msg: String },
    #[error("unsupported dataset {path}: {msg}")]
    Format { path: PathBuf, msg: String },
    #[error("variant {index} out of range (dataset has {count} variants)")]
    MissingVariant { index: usize, count: usize },
    #[error(
        "label variant {label} is {actual_h}x{actual_w}, expected {expected_h}x{expected_w} for rate {rate}"
    )]
    ScaleMismatch {
        label: String,
        rate: usize,
        expected_h: usize,
        expected_w: usize,
        actual_h: usize,
        actual_w: usize,
    },
    #[error("{0}")]
    Other(String),
}

/// Per-sample layout of one resolution variant (CHW).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl VariantShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Elements per sample.
    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }
}

/// One resolution level of the patch set, stored sample-major.
#[derive(Debug, Clone)]
pub struct PatchVariant {
    pub name: String,
    pub shape: VariantShape,
    /// `samples * shape.numel()` values, sample after sample.
    pub data: Vec<f32>,
}

impl PatchVariant {
    pub fn new(name: impl Into<String>, shape: VariantShape, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            data,
        }
    }

    pub fn samples(&self) -> usize {
        let numel = self.shape.numel();
        if numel == 0 {
            0
        } else {
            self.data.len() / numel
        }
    }
}
