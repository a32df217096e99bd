// ============================================================
// Layer 5 — Optimizer Binding, Clipping, LR Schedule
// ============================================================
// BoundOptimizer wraps a Burn optimizer together with the
// parameter ids it may update and its learning-rate schedule.
//
// One training step:
//
//   loss.backward()
//       │
//       ▼
//   keep gradients of bound params only   (frozen ⇒ no update)
//       │
//       ▼
//   scale all gradients so the global L2 norm ≤ max_norm
//       │
//       ▼
//   Adam step at schedule.current(), then schedule.step()
//
// Rebinding after the trainable set grows means building a new
// BoundOptimizer: Adam moments start from zero again.
//
// Reference: Kingma & Ba (2015) Adam
//            Pascanu et al. (2013) gradient norm clipping

use anyhow::Result;
use burn::{
    module::{AutodiffModule, Module, ModuleVisitor, ParamId},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::trainable::TrainableSet;
use crate::ml::registry::ParameterRegistry;

// ─── Learning-rate schedule ───────────────────────────────────────────────────

/// lr = base_lr × gamma^⌊steps / step_size⌋
#[derive(Debug, Clone, PartialEq)]
pub struct StepLr {
    base_lr:   f64,
    step_size: usize,
    gamma:     f64,
    steps:     usize,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self { base_lr, step_size, gamma, steps: 0 }
    }

    pub fn current(&self) -> f64 {
        if self.step_size == 0 {
            return self.base_lr;
        }
        let decays = self.steps / self.step_size;
        self.base_lr * self.gamma.powi(decays as i32)
    }

    pub fn step(&mut self) {
        self.steps += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LrSchedule {
    Constant(f64),
    Step(StepLr),
}

impl LrSchedule {
    pub fn current(&self) -> f64 {
        match self {
            LrSchedule::Constant(lr) => *lr,
            LrSchedule::Step(step)   => step.current(),
        }
    }

    pub fn step(&mut self) {
        if let LrSchedule::Step(step) = self {
            step.step();
        }
    }
}

// ─── Gradient norm clipping ───────────────────────────────────────────────────

struct GradNorm<'a> {
    grads:  &'a GradientsParams,
    sum_sq: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct GradScale<'a> {
    grads:  &'a mut GradientsParams,
    factor: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// Global L2 norm over every gradient present in `grads`.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut norm = GradNorm { grads, sum_sq: 0.0 };
    module.visit(&mut norm);
    norm.sum_sq.sqrt()
}

/// Factor applied to every gradient: never above 1.
pub fn clip_coefficient(total_norm: f64, max_norm: f64) -> f64 {
    (max_norm / (total_norm + 1e-6)).min(1.0)
}

/// Rescale `grads` in place so their global norm is at most
/// `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let total_norm = global_grad_norm::<B, M>(module, grads);
    let factor     = clip_coefficient(total_norm, max_norm);
    if factor < 1.0 {
        module.visit(&mut GradScale { grads, factor });
    }
    total_norm
}

// ─── Bound optimizer ──────────────────────────────────────────────────────────

pub struct BoundOptimizer<O> {
    optim:    O,
    params:   Vec<ParamId>,
    schedule: LrSchedule,
}

impl<O> BoundOptimizer<O> {
    /// Bind `optim` to the parameters of every component in `trainable`.
    pub fn bind(
        optim:     O,
        registry:  &ParameterRegistry,
        trainable: &TrainableSet,
        schedule:  LrSchedule,
    ) -> Result<Self> {
        let params = registry.resolve(trainable)?;
        tracing::debug!(
            "Optimizer bound to {} tensors ({} parameters), lr={:e}",
            params.len(),
            registry.trainable_params(trainable),
            schedule.current(),
        );
        Ok(Self { optim, params, schedule })
    }

    pub fn learning_rate(&self) -> f64 {
        self.schedule.current()
    }

    /// Backward pass, clipping, one optimizer step and one
    /// schedule step. Returns the updated model and the gradient
    /// norm before clipping.
    pub fn backward_step<B, M>(&mut self, model: M, loss: Tensor<B, 1>, max_norm: f64) -> (M, f64)
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let mut grads = loss.backward();
        let mut grads = GradientsParams::from_params(&mut grads, &model, &self.params);
        let norm = clip_grad_norm::<B, M>(&model, &mut grads, max_norm);

        let model = self.optim.step(self.schedule.current(), model, grads);
        self.schedule.step();
        (model, norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        module::Param,
        optim::AdamConfig,
    };

    use crate::domain::component::{ComponentPath, Part};
    use crate::domain::traits::ParamFlags;
    use crate::ml::model::{tests::tiny_config, Seq2SeqModel};

    type TestBackend = Autodiff<NdArray>;

    #[derive(Module, Debug)]
    struct Probe<B: Backend> {
        weight: Param<Tensor<B, 1>>,
    }

    #[test]
    fn test_step_lr_decays_every_step_size() {
        let mut lr = StepLr::new(1e-3, 2, 0.5);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(lr.current());
            lr.step();
        }
        assert_eq!(seen, vec![1e-3, 1e-3, 5e-4, 5e-4, 2.5e-4]);
    }

    #[test]
    fn test_constant_schedule_does_not_move() {
        let mut lr = LrSchedule::Constant(1e-8);
        lr.step();
        lr.step();
        assert_eq!(lr.current(), 1e-8);
    }

    #[test]
    fn test_clip_coefficient() {
        assert_eq!(clip_coefficient(0.5, 1.0), 1.0);
        assert!(clip_coefficient(10.0, 1.0) < 0.1 + 1e-9);
    }

    #[test]
    fn test_clip_norm_ten_to_one() {
        let device = Default::default();
        let probe = Probe::<TestBackend> {
            weight: Param::from_tensor(Tensor::zeros([4], &device)),
        };

        // d/dw (w · [6, 8, 0, 0]) = [6, 8, 0, 0], norm 10
        let coeffs = Tensor::<TestBackend, 1>::from_floats([6.0, 8.0, 0.0, 0.0], &device);
        let loss   = (probe.weight.val() * coeffs).sum();
        let mut grads = GradientsParams::from_grads(loss.backward(), &probe);

        let before = clip_grad_norm::<TestBackend, _>(&probe, &mut grads, 1.0);
        assert!((before - 10.0).abs() < 1e-4);

        let after = global_grad_norm::<TestBackend, _>(&probe, &grads);
        assert!(after <= 1.0);
        assert!(after > 0.99);
    }

    #[test]
    fn test_small_gradients_are_untouched() {
        let device = Default::default();
        let probe = Probe::<TestBackend> {
            weight: Param::from_tensor(Tensor::zeros([2], &device)),
        };
        let coeffs = Tensor::<TestBackend, 1>::from_floats([0.3, 0.4], &device);
        let loss   = (probe.weight.val() * coeffs).sum();
        let mut grads = GradientsParams::from_grads(loss.backward(), &probe);

        clip_grad_norm::<TestBackend, _>(&probe, &mut grads, 1.0);
        let after = global_grad_norm::<TestBackend, _>(&probe, &grads);
        assert!((after - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_frozen_components_are_not_updated() {
        let device = Default::default();
        let model: Seq2SeqModel<TestBackend> = tiny_config(20).init(&device);
        let registry = ParameterRegistry::build(&model);

        let mut trainable = TrainableSet::frozen();
        trainable.unfreeze(ComponentPath::FinalLayerNorm(Part::Decoder));

        // layer-norm gamma and beta
        assert_eq!(registry.resolve(&trainable).unwrap().len(), 2);
        let adam = AdamConfig::new().init::<TestBackend, Seq2SeqModel<TestBackend>>();
        let mut optim = BoundOptimizer::bind(adam, &registry, &trainable, LrSchedule::Constant(1e-2)).unwrap();

        let shared_before = model.shared.weight.val().into_data();
        let norm_before   = model.decoder.layer_norm.gamma.val().into_data();

        let ids = Tensor::<TestBackend, 1, Int>::from_ints([5, 6, 7, 8], &device).reshape([1, 4]);
        let mask = Tensor::<TestBackend, 1, Int>::from_ints([1, 1, 1, 1], &device).reshape([1, 4]);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([9, 10, 11, 12], &device).reshape([1, 4]);
        let loss = model.forward(ids, mask, Some(labels)).loss.unwrap();

        let (model, norm) = optim.backward_step(model, loss, 1.0);
        assert!(norm > 0.0);

        assert_eq!(model.shared.weight.val().into_data(), shared_before);
        assert_ne!(model.decoder.layer_norm.gamma.val().into_data(), norm_before);
    }
}
