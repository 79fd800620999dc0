use burn::nn::loss::Reduction;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

pub const CHARBONNIER_EPS: f32 = 1e-3;

/// Smoothed L1: `sqrt(d^2 + eps^2) - eps` per element.
#[derive(Debug, Clone, Copy)]
pub struct CharbonnierLoss {
    pub eps: f32,
}

impl Default for CharbonnierLoss {
    fn default() -> Self {
        Self {
            eps: CHARBONNIER_EPS,
        }
    }
}

impl CharbonnierLoss {
    pub fn new(eps: f32) -> Self {
        Self { eps }
    }

    /// Per-element loss, same shape as the inputs.
    pub fn forward_no_reduction<B: Backend, const D: usize>(
        &self,
        target: Tensor<B, D>,
        prediction: Tensor<B, D>,
    ) -> Tensor<B, D> {
        // With a = |d| and m = max(a, eps):
        //   sqrt(a^2 + eps^2) - eps = a * u / (sqrt(u^2 + v^2) + v),  u = a/m, v = eps/m
        // u and v stay in [0, 1], so nothing overflows and d = 0 gives exactly 0.
        let a = (prediction - target).abs();
        let m = a.clone().clamp_min(self.eps);
        let u = a.clone() / m.clone();
        let v = m.recip().mul_scalar(self.eps);
        let denom = (u.clone() * u.clone() + v.clone() * v.clone()).sqrt() + v;
        a * u / denom
    }

    /// `Sum` matches the training criterion; `Mean` and `Auto` average.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        target: Tensor<B, D>,
        prediction: Tensor<B, D>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let per_elem = self.forward_no_reduction(target, prediction);
        match reduction {
            Reduction::Sum => per_elem.sum(),
            Reduction::Mean | Reduction::Auto => per_elem.mean(),
        }
    }
}
