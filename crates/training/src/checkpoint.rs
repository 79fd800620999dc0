//! Per-epoch checkpoints.
//!
//! Layout: `<root>/x<rate>/epoch_<E>/{model.bin, optim.bin, meta.json}`. The
//! same directory serves both resume (model + optimizer + epoch) and
//! pretrained initialisation (model only).

use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::backend::{AutodiffBackend, Backend};
use models::{ModelConfigError, SrSeNet, SrSeNetConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MODEL_FILE: &str = "model.bin";
pub const OPTIM_FILE: &str = "optim.bin";
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid checkpoint metadata {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read or write record {path}: {source}")]
    Recorder {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },
    #[error("checkpoint {path} was trained with {found:?}, current model is {expected:?}")]
    ConfigMismatch {
        path: PathBuf,
        expected: Box<SrSeNetConfig>,
        found: Box<SrSeNetConfig>,
    },
    #[error("checkpoint model config: {0}")]
    Model(#[from] ModelConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub rate: usize,
    pub model: SrSeNetConfig,
    pub last_loss: Option<f32>,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub dir: PathBuf,
    pub model: PathBuf,
    pub optim: PathBuf,
    pub meta: PathBuf,
}

impl CheckpointPaths {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            model: dir.join(MODEL_FILE),
            optim: dir.join(OPTIM_FILE),
            meta: dir.join(META_FILE),
            dir,
        }
    }

    pub fn for_epoch(root: &Path, rate: usize, epoch: usize) -> Self {
        Self::in_dir(root.join(format!("x{rate}")).join(format!("epoch_{epoch}")))
    }

    /// Accept either a checkpoint directory or any file inside one.
    pub fn resolve(path: &Path) -> Self {
        if path.is_file() {
            Self::in_dir(path.parent().unwrap_or_else(|| Path::new(".")))
        } else {
            Self::in_dir(path)
        }
    }
}

fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

pub fn save_checkpoint<B, O>(
    root: &Path,
    epoch: usize,
    cfg: &SrSeNetConfig,
    model: &SrSeNet<B>,
    optim: &O,
    last_loss: Option<f32>,
) -> Result<CheckpointPaths, CheckpointError>
where
    B: AutodiffBackend,
    O: Optimizer<SrSeNet<B>, B>,
{
    let paths = CheckpointPaths::for_epoch(root, cfg.rate, epoch);
    fs::create_dir_all(&paths.dir).map_err(|e| CheckpointError::Io {
        path: paths.dir.clone(),
        source: e,
    })?;

    let recorder = recorder();
    model
        .clone()
        .save_file(paths.model.clone(), &recorder)
        .map_err(|e| CheckpointError::Recorder {
            path: paths.model.clone(),
            source: e,
        })?;
    Recorder::<B>::record(&recorder, optim.to_record(), paths.optim.clone()).map_err(|e| {
        CheckpointError::Recorder {
            path: paths.optim.clone(),
            source: e,
        }
    })?;

    let meta = CheckpointMeta {
        epoch,
        rate: cfg.rate,
        model: cfg.clone(),
        last_loss,
        created_at_ms: patch_dataset::now_ms(),
    };
    let json = serde_json::to_vec_pretty(&meta).map_err(|e| CheckpointError::Json {
        path: paths.meta.clone(),
        source: e,
    })?;
    fs::write(&paths.meta, json).map_err(|e| CheckpointError::Io {
        path: paths.meta.clone(),
        source: e,
    })?;
    tracing::debug!(dir = %paths.dir.display(), epoch, "checkpoint written");
    Ok(paths)
}

pub fn load_checkpoint_meta(path: &Path) -> Result<CheckpointMeta, CheckpointError> {
    let paths = CheckpointPaths::resolve(path);
    let raw = fs::read(&paths.meta).map_err(|e| CheckpointError::Io {
        path: paths.meta.clone(),
        source: e,
    })?;
    serde_json::from_slice(&raw).map_err(|e| CheckpointError::Json {
        path: paths.meta,
        source: e,
    })
}

fn ensure_compatible(
    path: &Path,
    expected: &SrSeNetConfig,
    found: &SrSeNetConfig,
) -> Result<(), CheckpointError> {
    if expected != found {
        return Err(CheckpointError::ConfigMismatch {
            path: path.to_path_buf(),
            expected: Box::new(expected.clone()),
            found: Box::new(found.clone()),
        });
    }
    Ok(())
}

/// Restore model, optimizer and epoch. The checkpoint must have been written
/// for the same model configuration.
pub fn resume_from<B, O>(
    path: &Path,
    cfg: &SrSeNetConfig,
    model: SrSeNet<B>,
    optim: O,
    device: &B::Device,
) -> Result<(SrSeNet<B>, O, CheckpointMeta), CheckpointError>
where
    B: AutodiffBackend,
    O: Optimizer<SrSeNet<B>, B>,
{
    let paths = CheckpointPaths::resolve(path);
    let meta = load_checkpoint_meta(&paths.dir)?;
    ensure_compatible(&paths.dir, cfg, &meta.model)?;

    let recorder = recorder();
    let model = model
        .load_file(paths.model.clone(), &recorder, device)
        .map_err(|e| CheckpointError::Recorder {
            path: paths.model.clone(),
            source: e,
        })?;
    let record = Recorder::<B>::load(&recorder, paths.optim.clone(), device).map_err(|e| {
        CheckpointError::Recorder {
            path: paths.optim.clone(),
            source: e,
        }
    })?;
    Ok((model, optim.load_record(record), meta))
}

/// Copy weights into `model`. `path` is a checkpoint directory or a bare
/// model record; when a `meta.json` sits next to it the configs must match.
pub fn load_pretrained_weights<B: Backend>(
    path: &Path,
    cfg: &SrSeNetConfig,
    model: SrSeNet<B>,
    device: &B::Device,
) -> Result<SrSeNet<B>, CheckpointError> {
    let model_path = if path.is_dir() {
        path.join(MODEL_FILE)
    } else {
        path.to_path_buf()
    };
    let paths = CheckpointPaths::resolve(path);
    if paths.meta.is_file() {
        let meta = load_checkpoint_meta(&paths.dir)?;
        ensure_compatible(&paths.dir, cfg, &meta.model)?;
    }
    model
        .load_file(model_path.clone(), &recorder(), device)
        .map_err(|e| CheckpointError::Recorder {
            path: model_path,
            source: e,
        })
}

/// Build a model from the checkpoint's own config and load its weights.
pub fn load_model_from_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(SrSeNet<B>, CheckpointMeta), CheckpointError> {
    let paths = CheckpointPaths::resolve(path);
    let meta = load_checkpoint_meta(&paths.dir)?;
    let model = SrSeNet::<B>::new(&meta.model, device)?
        .load_file(paths.model.clone(), &recorder(), device)
        .map_err(|e| CheckpointError::Recorder {
            path: paths.model.clone(),
            source: e,
        })?;
    Ok((model, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::optim::AdamConfig;
    use models::parameter_snapshot;

    type B = Autodiff<burn_ndarray::NdArray<f32>>;

    fn cfg() -> SrSeNetConfig {
        SrSeNetConfig::new(1, 2, true).with_features(4)
    }

    #[test]
    fn paths_follow_rate_and_epoch() {
        let paths = CheckpointPaths::for_epoch(Path::new("ckpt"), 3, 12);
        assert_eq!(paths.dir, Path::new("ckpt/x3/epoch_12"));
        assert_eq!(paths.model, Path::new("ckpt/x3/epoch_12/model.bin"));
        assert_eq!(paths.meta, Path::new("ckpt/x3/epoch_12/meta.json"));
    }

    #[test]
    fn save_then_load_restores_weights_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = SrSeNet::<B>::new(&cfg(), &device).unwrap();
        let optim = AdamConfig::new().init::<B, SrSeNet<B>>();
        let paths = save_checkpoint(dir.path(), 4, &cfg(), &model, &optim, Some(0.5)).unwrap();
        assert!(paths.model.is_file() && paths.optim.is_file());

        let meta = load_checkpoint_meta(&paths.dir).unwrap();
        assert_eq!(meta.epoch, 4);
        assert_eq!(meta.model, cfg());

        let (loaded, _) = load_model_from_checkpoint::<B>(&paths.model, &device).unwrap();
        assert_eq!(
            parameter_snapshot::<B, _>(&loaded),
            parameter_snapshot::<B, _>(&model)
        );

        let fresh = SrSeNet::<B>::new(&cfg(), &device).unwrap();
        let pretrained = load_pretrained_weights(&paths.dir, &cfg(), fresh, &device).unwrap();
        assert_eq!(
            parameter_snapshot::<B, _>(&pretrained),
            parameter_snapshot::<B, _>(&model)
        );
    }

    #[test]
    fn mismatched_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = SrSeNet::<B>::new(&cfg(), &device).unwrap();
        let optim = AdamConfig::new().init::<B, SrSeNet<B>>();
        let paths = save_checkpoint(dir.path(), 1, &cfg(), &model, &optim, None).unwrap();

        let other = SrSeNetConfig::new(2, 2, true).with_features(4);
        let fresh = SrSeNet::<B>::new(&other, &device).unwrap();
        let optim = AdamConfig::new().init::<B, SrSeNet<B>>();
        let result = resume_from(&paths.dir, &other, fresh, optim, &device);
        assert!(matches!(result, Err(CheckpointError::ConfigMismatch { .. })));
    }
}
