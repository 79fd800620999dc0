use burn::module::Module;
use burn::nn::loss::Reduction;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use cli_support::{DeviceArgs, DeviceOpts};
use models::{CharbonnierLoss, SrSeNet, SrSeNetConfig};
use std::path::{Path, PathBuf};

use crate::checkpoint::{load_pretrained_weights, resume_from, save_checkpoint};
use crate::dataset::{open_patch_loader, DatasetPathConfig};
use crate::scalars::{JsonlScalarWriter, ScalarSink};
use crate::ADBackend;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "train", about = "Train SrSENet on paired low/high resolution patches")]
pub struct TrainArgs {
    /// Use SE layers in the residual blocks.
    #[arg(long = "use_se", default_value_t = false)]
    pub use_se: bool,
    /// Training batch size.
    #[arg(long = "batchSize", default_value_t = 64)]
    pub batch_size: usize,
    /// Upscale rate.
    #[arg(long, default_value_t = 2)]
    pub rate: usize,
    /// Number of SrSE blocks.
    #[arg(long, default_value_t = 8)]
    pub blocks: usize,
    /// Number of epochs to train for.
    #[arg(long = "nEpochs", default_value_t = 300)]
    pub n_epochs: usize,
    /// Learning rate.
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,
    /// Decay the learning rate by 10x every n epochs (0 disables).
    #[arg(long, default_value_t = 100)]
    pub step: usize,
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Checkpoint to resume from (directory or a file inside it).
    #[arg(long)]
    pub resume: Option<PathBuf>,
    /// First epoch to run (overridden by --resume).
    #[arg(long = "start-epoch", default_value_t = 1)]
    pub start_epoch: usize,
    /// Background threads for batch loading.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Adam beta_1.
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f32,
    /// L2 penalty (0 disables).
    #[arg(long = "weight-decay", visible_alias = "wd", default_value_t = 1e-4)]
    pub weight_decay: f32,
    /// Pretrained weights (checkpoint directory or model record).
    #[arg(long)]
    pub pretrained: Option<PathBuf>,
    /// Training dataset (.h5 or shard manifest .json).
    #[arg(long)]
    pub datasets: Option<PathBuf>,
    /// Seed for parameter init and shuffling.
    #[arg(long, default_value_t = 774)]
    pub seed: u64,
    /// Root directory for checkpoints.
    #[arg(long = "checkpoint-dir", default_value = "checkpoint")]
    pub checkpoint_dir: PathBuf,
    /// Directory for scalar logs (default runs/<unix-ms>).
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,
    /// Log the loss every n iterations.
    #[arg(long = "log-every", default_value_t = 10)]
    pub log_every: usize,
}

impl TrainArgs {
    pub fn model_config(&self, channels: usize) -> SrSeNetConfig {
        SrSeNetConfig::new(self.blocks, self.rate, self.use_se).with_channels(channels)
    }

    pub fn optimizer_config(&self) -> AdamConfig {
        let cfg = AdamConfig::new().with_beta_1(self.momentum);
        if self.weight_decay > 0.0 {
            cfg.with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay)))
        } else {
            cfg
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub start_epoch: usize,
    pub epochs_run: usize,
    pub global_step: usize,
    pub last_loss: Option<f32>,
    pub last_checkpoint: Option<PathBuf>,
}

/// `base * 0.1^(epoch / step)`.
pub fn learning_rate_for_epoch(base: f64, epoch: usize, step: usize) -> f64 {
    if step == 0 {
        return base;
    }
    base * 0.1f64.powi((epoch / step) as i32)
}

pub fn validate_device_choice(opts: &DeviceOpts) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (opts.cuda, built_wgpu) {
        (true, false) => {
            anyhow::bail!("No GPU backend built, please run without --cuda or rebuild with --features backend-wgpu")
        }
        (false, true) => {
            tracing::info!("built with backend-wgpu; training will use the WGPU backend without --cuda");
        }
        _ => {}
    }
    opts.warn_if_multi_gpu();
    Ok(())
}

fn default_log_dir() -> PathBuf {
    Path::new("runs").join(patch_dataset::now_ms().to_string())
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<TrainSummary> {
    let log_dir = args.log_dir.clone().unwrap_or_else(default_log_dir);
    let mut sink = JsonlScalarWriter::create(&log_dir)?;
    tracing::info!(path = %sink.path().display(), "writing scalars");
    run_train_with_sink(&args, &mut sink)
}

pub fn run_train_with_sink(
    args: &TrainArgs,
    sink: &mut dyn ScalarSink,
) -> anyhow::Result<TrainSummary> {
    tracing::info!(?args, "options");
    validate_device_choice(&DeviceOpts::from(&args.device))?;

    ADBackend::seed(args.seed);
    let device = <ADBackend as Backend>::Device::default();

    tracing::info!("===> Loading datasets");
    let dataset_path = args
        .datasets
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--datasets is required"))?;
    let loader = open_patch_loader(&DatasetPathConfig {
        path: dataset_path,
        rate: args.rate,
        batch_size: args.batch_size,
        threads: args.threads,
        shuffle: true,
        seed: args.seed,
    })?;
    let batch_count = loader.len();

    tracing::info!("===> Building model");
    let model_cfg = args.model_config(loader.input_shape().channels);
    let mut model = SrSeNet::<ADBackend>::new(&model_cfg, &device)?;
    let criterion = CharbonnierLoss::default();
    let mut optim = args.optimizer_config().init::<ADBackend, SrSeNet<ADBackend>>();
    let mut start_epoch = args.start_epoch;

    if let Some(path) = &args.resume {
        if path.exists() {
            tracing::info!(path = %path.display(), "=> loading checkpoint");
            let (m, o, meta) = resume_from(path, &model_cfg, model, optim, &device)?;
            model = m;
            optim = o;
            start_epoch = meta.epoch + 1;
        } else {
            tracing::warn!(path = %path.display(), "=> no checkpoint found");
        }
    }

    if let Some(path) = &args.pretrained {
        if path.exists() {
            tracing::info!(path = %path.display(), "=> loading model");
            model = load_pretrained_weights(path, &model_cfg, model, &device)?;
        } else {
            tracing::warn!(path = %path.display(), "=> no model found");
        }
    }
    tracing::info!(
        params = model.num_params(),
        blocks = model_cfg.blocks,
        rate = model_cfg.rate,
        use_se = model_cfg.use_se,
        "model ready"
    );

    tracing::info!("===> Training");
    let log_every = args.log_every.max(1);
    let mut summary = TrainSummary {
        start_epoch,
        epochs_run: 0,
        global_step: 0,
        last_loss: None,
        last_checkpoint: None,
    };
    for epoch in start_epoch..=args.n_epochs {
        let lr = learning_rate_for_epoch(args.lr, epoch, args.step);
        tracing::info!("epoch = {epoch} lr = {lr}");

        let mut last_loss = None;
        for (i, batch) in loader.iter_epoch(epoch).enumerate() {
            let iteration = i + 1;
            let (input, label) = batch.to_tensors::<ADBackend>(&device);
            let sr = model.forward(input);
            let loss = criterion.forward(label, sr, Reduction::Sum);
            let loss_val: f32 = loss
                .clone()
                .detach()
                .into_data()
                .to_vec::<f32>()
                .unwrap_or_default()
                .into_iter()
                .next()
                .unwrap_or(0.0);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);
            last_loss = Some(loss_val);

            if iteration % log_every == 0 {
                tracing::info!(
                    "===> Epoch[{epoch}]({iteration}/{batch_count}): Loss: {loss_val:.6}"
                );
                sink.add_scalar("loss", loss_val, batch_count * epoch + iteration)?;
            }
            summary.global_step = batch_count * epoch + iteration;
        }
        sink.flush()?;

        let paths =
            save_checkpoint(&args.checkpoint_dir, epoch, &model_cfg, &model, &optim, last_loss)?;
        tracing::info!(dir = %paths.dir.display(), "checkpoint saved");
        summary.epochs_run += 1;
        summary.last_loss = last_loss;
        summary.last_checkpoint = Some(paths.dir);
    }

    tracing::info!(
        epochs = summary.epochs_run,
        checkpoint = ?summary.last_checkpoint,
        "training finished"
    );
    Ok(summary)
}
