//! Global-norm gradient clipping.
//!
//! Burn's built-in clipping rescales each parameter on its own. PPO clips
//! the concatenation of all gradients: when the global L2 norm exceeds
//! `max_norm`, every gradient is scaled by `max_norm / norm`.

use burn::module::{AutodiffModule, ModuleVisitor, Param};
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};

/// Sums squared gradient entries over every float parameter.
struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id) {
            let sq: f32 = grad.powf_scalar(2.0).sum().into_scalar().elem();
            self.total += sq as f64;
        }
    }
}

/// Multiplies every gradient by a constant.
struct Rescale<'a> {
    grads: &'a mut GradientsParams,
    factor: f32,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(param.id) {
            self.grads.register(param.id, grad.mul_scalar(self.factor));
        }
    }
}

/// Global L2 norm of the gradients of `module`.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f32
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm { grads, total: 0.0 };
    module.visit(&mut visitor);
    visitor.total.sqrt() as f32
}

/// Clip to `max_norm` in place. Returns the norm measured before clipping.
pub fn clip_grad_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f32) -> f32
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = global_grad_norm::<B, M>(module, grads);
    if norm > max_norm && norm.is_finite() {
        let mut visitor = Rescale {
            grads,
            factor: max_norm / (norm + 1e-6),
        };
        module.visit(&mut visitor);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::Module;
    use burn::nn::{Linear, LinearConfig};

    type B = Autodiff<NdArray<f32>>;

    #[derive(Module, Debug)]
    struct TwoLayer<B: burn::tensor::backend::Backend> {
        a: Linear<B>,
        b: Linear<B>,
    }

    fn grads_for(model: &TwoLayer<B>, scale: f32) -> GradientsParams {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::ones([4, 3], &device) * scale;
        let loss = model.b.forward(model.a.forward(x)).sum();
        GradientsParams::from_grads(loss.backward(), model)
    }

    fn model() -> TwoLayer<B> {
        let device = Default::default();
        TwoLayer {
            a: LinearConfig::new(3, 5).init(&device),
            b: LinearConfig::new(5, 2).init(&device),
        }
    }

    #[test]
    fn test_clip_scales_to_max_norm() {
        let model = model();
        let mut grads = grads_for(&model, 50.0);

        let before = clip_grad_norm::<B, _>(&model, &mut grads, 0.5);
        assert!(before > 0.5);

        let after = global_grad_norm::<B, _>(&model, &grads);
        assert!((after - 0.5).abs() < 1e-3, "norm after clip {}", after);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let model = model();
        let mut grads = grads_for(&model, 1e-3);

        let before = global_grad_norm::<B, _>(&model, &grads);
        let reported = clip_grad_norm::<B, _>(&model, &mut grads, 1e6);
        let after = global_grad_norm::<B, _>(&model, &grads);

        assert_eq!(before, reported);
        assert!((after - before).abs() < 1e-9);
    }
}
