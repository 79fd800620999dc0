//! Shared CLI pieces for the training, evaluation and packing binaries.

pub mod common;
pub mod logging;

pub use common::{DeviceArgs, DeviceOpts, ShardOutputArgs, ShardOutputOpts};
pub use logging::init_logging;
