use burn::module::{Module, ModuleVisitor, ParamId};
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("upscale rate {0} is not supported (must be >= 2 and a product of 2s and 3s)")]
    UnsupportedRate(usize),
    #[error("{field} must be positive")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrSeNetConfig {
    pub blocks: usize,
    pub rate: usize,
    pub use_se: bool,
    /// Image channels in and out.
    pub channels: usize,
    pub features: usize,
    pub se_reduction: usize,
}

impl Default for SrSeNetConfig {
    fn default() -> Self {
        Self {
            blocks: 8,
            rate: 2,
            use_se: false,
            channels: 1,
            features: 64,
            se_reduction: 16,
        }
    }
}

impl SrSeNetConfig {
    pub fn new(blocks: usize, rate: usize, use_se: bool) -> Self {
        Self {
            blocks,
            rate,
            use_se,
            ..Self::default()
        }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_features(mut self, features: usize) -> Self {
        self.features = features;
        self
    }

    /// Pixel-shuffle factors whose product is `rate`, 2s first.
    pub fn upscale_stages(&self) -> Result<Vec<usize>, ModelConfigError> {
        if self.rate < 2 {
            return Err(ModelConfigError::UnsupportedRate(self.rate));
        }
        let mut rest = self.rate;
        let mut stages = Vec::new();
        for factor in [2, 3] {
            while rest % factor == 0 {
                stages.push(factor);
                rest /= factor;
            }
        }
        if rest != 1 {
            return Err(ModelConfigError::UnsupportedRate(self.rate));
        }
        Ok(stages)
    }

    pub fn validate(&self) -> Result<(), ModelConfigError> {
        if self.channels == 0 {
            return Err(ModelConfigError::Zero { field: "channels" });
        }
        if self.features == 0 {
            return Err(ModelConfigError::Zero { field: "features" });
        }
        if self.use_se && self.se_reduction == 0 {
            return Err(ModelConfigError::Zero {
                field: "se_reduction",
            });
        }
        self.upscale_stages().map(|_| ())
    }
}

fn conv3x3<B: Backend>(cin: usize, cout: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([cin, cout], [3, 3])
        .with_padding(nn::PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

/// Squeeze-excitation channel attention.
#[derive(Debug, Module)]
pub struct SeLayer<B: Backend> {
    squeeze: nn::Linear<B>,
    excite: nn::Linear<B>,
}

impl<B: Backend> SeLayer<B> {
    pub fn new(features: usize, reduction: usize, device: &B::Device) -> Self {
        let hidden = (features / reduction).max(1);
        Self {
            squeeze: nn::LinearConfig::new(features, hidden).init(device),
            excite: nn::LinearConfig::new(hidden, features).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, _, _] = x.dims();
        let pooled = x.clone().mean_dim(3).mean_dim(2).reshape([b, c]);
        let scale = relu(self.squeeze.forward(pooled));
        let scale = sigmoid(self.excite.forward(scale)).reshape([b, c, 1, 1]);
        x * scale
    }
}

#[derive(Debug, Module)]
pub struct SrSeBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    se: Option<SeLayer<B>>,
}

impl<B: Backend> SrSeBlock<B> {
    pub fn new(cfg: &SrSeNetConfig, device: &B::Device) -> Self {
        let f = cfg.features;
        Self {
            conv1: conv3x3(f, f, device),
            conv2: conv3x3(f, f, device),
            se: cfg
                .use_se
                .then(|| SeLayer::new(f, cfg.se_reduction, device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = relu(self.conv1.forward(x.clone()));
        let mut out = self.conv2.forward(out);
        if let Some(se) = &self.se {
            out = se.forward(out);
        }
        out + x
    }
}

/// Conv to `features * factor^2` channels, then pixel shuffle.
#[derive(Debug, Module)]
pub struct UpsampleStage<B: Backend> {
    conv: Conv2d<B>,
    factor: usize,
}

impl<B: Backend> UpsampleStage<B> {
    pub fn new(features: usize, factor: usize, device: &B::Device) -> Self {
        Self {
            conv: conv3x3(features, features * factor * factor, device),
            factor,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(pixel_shuffle(self.conv.forward(x), self.factor))
    }
}

#[derive(Debug, Module)]
pub struct SrSeNet<B: Backend> {
    conv_input: Conv2d<B>,
    blocks: Vec<SrSeBlock<B>>,
    conv_mid: Conv2d<B>,
    upsample: Vec<UpsampleStage<B>>,
    conv_output: Conv2d<B>,
    rate: usize,
}

impl<B: Backend> SrSeNet<B> {
    pub fn new(cfg: &SrSeNetConfig, device: &B::Device) -> Result<Self, ModelConfigError> {
        cfg.validate()?;
        let f = cfg.features;
        let blocks = (0..cfg.blocks).map(|_| SrSeBlock::new(cfg, device)).collect();
        let upsample = cfg
            .upscale_stages()?
            .into_iter()
            .map(|s| UpsampleStage::new(f, s, device))
            .collect();
        Ok(Self {
            conv_input: conv3x3(cfg.channels, f, device),
            blocks,
            conv_mid: conv3x3(f, f, device),
            upsample,
            conv_output: conv3x3(f, cfg.channels, device),
            rate: cfg.rate,
        })
    }

    pub fn rate(&self) -> usize {
        self.rate
    }

    /// `[B, C, H, W]` -> `[B, C, H * rate, W * rate]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let head = relu(self.conv_input.forward(input));
        let mut x = head.clone();
        for block in &self.blocks {
            x = block.forward(x);
        }
        let mut x = self.conv_mid.forward(x) + head;
        for stage in &self.upsample {
            x = stage.forward(x);
        }
        self.conv_output.forward(x)
    }
}

/// Rearrange `[B, C*r*r, H, W]` into `[B, C, H*r, W*r]`; output pixel
/// `(h*r + i, w*r + j)` of channel `c` comes from input channel `c*r*r + i*r + j`.
pub fn pixel_shuffle<B: Backend>(x: Tensor<B, 4>, r: usize) -> Tensor<B, 4> {
    let [b, crr, h, w] = x.dims();
    let c = crr / (r * r);
    x.reshape([b, c, r, r, h, w])
        .permute([0, 1, 4, 2, 5, 3])
        .reshape([b, c, h * r, w * r])
}

struct SnapshotVisitor {
    values: Vec<f32>,
}

impl<B: Backend> ModuleVisitor<B> for SnapshotVisitor {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if let Ok(values) = tensor.clone().into_data().to_vec::<f32>() {
            self.values.extend(values);
        }
    }
}

/// Every float parameter flattened in module order. Used to compare runs.
pub fn parameter_snapshot<B: Backend, M: Module<B>>(module: &M) -> Vec<f32> {
    let mut visitor = SnapshotVisitor { values: Vec::new() };
    module.visit(&mut visitor);
    visitor.values
}
