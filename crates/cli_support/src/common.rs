use clap::Args;
use std::path::PathBuf;

/// Accelerator selection shared by train and eval.
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Use the GPU backend (requires a build with `backend-wgpu`).
    #[arg(long, default_value_t = false)]
    pub cuda: bool,
    /// Number of GPUs to use.
    #[arg(long, default_value_t = 4)]
    pub gpus: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOpts {
    pub cuda: bool,
    pub gpus: usize,
}

impl DeviceOpts {
    pub fn cpu() -> Self {
        Self {
            cuda: false,
            gpus: 0,
        }
    }

    /// Only one device is driven; extra GPUs are reported and ignored.
    pub fn warn_if_multi_gpu(&self) {
        if self.cuda && self.gpus > 1 {
            tracing::warn!(
                requested = self.gpus,
                "multi-GPU data parallelism is not supported; using a single device"
            );
        }
    }
}

impl From<&DeviceArgs> for DeviceOpts {
    fn from(args: &DeviceArgs) -> Self {
        DeviceOpts {
            cuda: args.cuda,
            gpus: args.gpus,
        }
    }
}

/// Shard output root for pack_patches.
#[derive(Debug, Clone, Args)]
pub struct ShardOutputArgs {
    /// Directory for the manifest and shard files.
    #[arg(long, default_value = "artifacts/patch_shards")]
    pub output: PathBuf,
    /// Samples per shard file.
    #[arg(long, default_value_t = 4096)]
    pub shard_size: usize,
}

#[derive(Debug, Clone)]
pub struct ShardOutputOpts {
    pub output: PathBuf,
    pub shard_size: usize,
}

impl From<&ShardOutputArgs> for ShardOutputOpts {
    fn from(args: &ShardOutputArgs) -> Self {
        ShardOutputOpts {
            output: args.output.clone(),
            shard_size: args.shard_size.max(1),
        }
    }
}
