//! Burn models for patch super-resolution.
//!
//! This crate defines:
//! - `SrSeNet`: residual network with optional squeeze-excitation blocks and a
//!   pixel-shuffle upsampler.
//! - `CharbonnierLoss`: smoothed L1 distance used as the training criterion.
//!
//! These are plain Burn modules; checkpointing and the training loop live in
//! the `training` crate.

pub mod loss;
pub mod srsenet;

pub use loss::{CharbonnierLoss, CHARBONNIER_EPS};
pub use srsenet::{
    parameter_snapshot, pixel_shuffle, ModelConfigError, SeLayer, SrSeBlock, SrSeNet,
    SrSeNetConfig, UpsampleStage,
};

pub mod prelude {
    pub use super::{CharbonnierLoss, SrSeNet, SrSeNetConfig};
    pub use burn::nn::loss::Reduction;
}
