pub mod checkpoint;
pub mod dataset;
pub mod eval;
pub mod scalars;
pub mod util;

pub use checkpoint::{
    load_checkpoint_meta, load_model_from_checkpoint, load_pretrained_weights, resume_from,
    save_checkpoint, CheckpointError, CheckpointMeta, CheckpointPaths,
};
pub use dataset::{open_patch_loader, DatasetPathConfig};
pub use eval::{evaluate, run_eval, EvalArgs, EvalReport};
pub use models::{CharbonnierLoss, SrSeNet, SrSeNetConfig};
pub use scalars::{JsonlScalarWriter, MemoryScalarSink, ScalarRecord, ScalarSink};
pub use util::{run_train, run_train_with_sink, TrainArgs, TrainSummary};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
