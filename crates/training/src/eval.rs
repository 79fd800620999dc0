//! Reconstruction quality of a checkpoint on a patch dataset.

use burn::tensor::backend::Backend;
use clap::Parser;
use cli_support::{DeviceArgs, DeviceOpts};
use models::{CharbonnierLoss, SrSeNet, SrSeNetConfig};
use patch_dataset::PatchLoader;
use std::path::PathBuf;

use crate::checkpoint::load_model_from_checkpoint;
use crate::dataset::{open_patch_loader, DatasetPathConfig};
use crate::util::validate_device_choice;
use crate::TrainBackend;

#[derive(Parser, Debug, Clone)]
#[command(name = "eval", about = "Evaluate an SrSENet checkpoint (Charbonnier loss and PSNR)")]
pub struct EvalArgs {
    /// Dataset (.h5 or shard manifest .json).
    #[arg(long)]
    pub datasets: PathBuf,
    /// Checkpoint directory (or a file inside it).
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    #[arg(long = "batchSize", default_value_t = 16)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Used only when no checkpoint can be loaded.
    #[arg(long, default_value_t = 2)]
    pub rate: usize,
    /// Used only when no checkpoint can be loaded.
    #[arg(long, default_value_t = 8)]
    pub blocks: usize,
    /// Used only when no checkpoint can be loaded.
    #[arg(long = "use_se", default_value_t = false)]
    pub use_se: bool,
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub samples: usize,
    pub batches: usize,
    /// Charbonnier loss averaged over every output element.
    pub mean_loss: f64,
    /// Peak value 1.0; infinite for a perfect reconstruction.
    pub psnr_db: f64,
}

fn scalar<B: Backend>(t: burn::tensor::Tensor<B, 1>) -> f64 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(0.0) as f64
}

pub fn evaluate<B: Backend>(
    model: &SrSeNet<B>,
    loader: &PatchLoader,
    device: &B::Device,
) -> EvalReport {
    let criterion = CharbonnierLoss::default();
    let mut loss_sum = 0.0f64;
    let mut sq_sum = 0.0f64;
    let mut elems = 0usize;
    let mut samples = 0usize;
    let mut batches = 0usize;
    for batch in loader.iter_epoch(0) {
        let (input, label) = batch.to_tensors::<B>(device);
        elems += label.dims().iter().product::<usize>();
        let sr = model.forward(input);
        let diff = sr.clone() - label.clone();
        sq_sum += scalar((diff.clone() * diff).sum());
        loss_sum += scalar(criterion.forward(label, sr, burn::nn::loss::Reduction::Sum));
        samples += batch.len();
        batches += 1;
    }
    let denom = elems.max(1) as f64;
    let mse = sq_sum / denom;
    EvalReport {
        samples,
        batches,
        mean_loss: loss_sum / denom,
        psnr_db: if mse > 0.0 {
            10.0 * (1.0 / mse).log10()
        } else {
            f64::INFINITY
        },
    }
}

pub fn run_eval(args: &EvalArgs) -> anyhow::Result<EvalReport> {
    validate_device_choice(&DeviceOpts::from(&args.device))?;
    let device = <TrainBackend as Backend>::Device::default();

    let loaded = match &args.checkpoint {
        Some(path) => match load_model_from_checkpoint::<TrainBackend>(path, &device) {
            Ok(found) => Some(found),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to load checkpoint; using fresh model ({e})");
                None
            }
        },
        None => {
            tracing::warn!("no checkpoint provided; using fresh model");
            None
        }
    };

    let rate = loaded.as_ref().map_or(args.rate, |(_, meta)| meta.rate);
    let loader = open_patch_loader(&DatasetPathConfig {
        path: &args.datasets,
        rate,
        batch_size: args.batch_size,
        threads: args.threads,
        shuffle: false,
        seed: 0,
    })?;

    let model = match loaded {
        Some((model, meta)) => {
            tracing::info!(epoch = meta.epoch, rate = meta.rate, "evaluating checkpoint");
            model
        }
        None => {
            let cfg = SrSeNetConfig::new(args.blocks, args.rate, args.use_se)
                .with_channels(loader.input_shape().channels);
            SrSeNet::<TrainBackend>::new(&cfg, &device)?
        }
    };
    Ok(evaluate(&model, &loader, &device))
}
