// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor, TensorError};
use std::collections::HashMap;

/// Stochastic gradient descent with heavy-ball momentum and L2 weight decay:
///
/// ```text
/// g ← ∇w + λ·w
/// v ← μ·v + g
/// w ← w − lr·v
/// ```
///
/// Velocity buffers are keyed by parameter name.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: HashMap<String, Tensor>,
}

impl Sgd {
    /// Plain SGD with the given learning rate.
    pub fn new(learning_rate: f32) -> PureResult<Self> {
        if learning_rate <= 0.0 || !learning_rate.is_finite() {
            return Err(TensorError::NonPositiveLearningRate {
                rate: learning_rate,
            });
        }
        Ok(Self {
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
            velocity: HashMap::new(),
        })
    }

    /// Overrides the momentum coefficient (clamped to `[0, 1)`).
    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum.clamp(0.0, 0.999);
        self
    }

    /// Overrides the L2 weight decay.
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay.max(0.0);
        self
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Sets the learning rate; schedulers call this once per epoch.
    pub fn set_learning_rate(&mut self, learning_rate: f32) -> PureResult<()> {
        if learning_rate <= 0.0 || !learning_rate.is_finite() {
            return Err(TensorError::NonPositiveLearningRate {
                rate: learning_rate,
            });
        }
        self.learning_rate = learning_rate;
        Ok(())
    }

    /// Clears the gradients of every parameter of `module`.
    pub fn zero_grad<M: Module + ?Sized>(&self, module: &mut M) -> PureResult<()> {
        module.zero_accumulators()
    }

    /// Applies one update to every parameter holding a gradient and clears it.
    pub fn step<M: Module + ?Sized>(&mut self, module: &mut M) -> PureResult<()> {
        let Self {
            learning_rate,
            momentum,
            weight_decay,
            velocity,
        } = self;
        module.visit_parameters_mut(&mut |param| {
            let Some(grad) = param.gradient() else {
                return Ok(());
            };
            let mut update = grad.clone();
            if *weight_decay > 0.0 {
                update.add_scaled(param.value(), *weight_decay)?;
            }
            if *momentum > 0.0 {
                match velocity.get_mut(param.name()) {
                    Some(buffer) => {
                        let mut next = buffer.scale(*momentum)?;
                        next.add_scaled(&update, 1.0)?;
                        *buffer = next;
                        update = buffer.clone();
                    }
                    None => {
                        velocity.insert(param.name().to_string(), update.clone());
                    }
                }
            }
            param.value_mut().add_scaled(&update, -*learning_rate)?;
            param.zero_gradient();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::linear::Linear;

    #[test]
    fn rejects_non_positive_learning_rate() {
        assert!(Sgd::new(0.0).is_err());
        assert!(Sgd::new(f32::NAN).is_err());
    }

    #[test]
    fn momentum_accelerates_repeated_gradients() {
        let mut layer = Linear::with_seed("fc", 1, 1, Some(3)).unwrap();
        let start = layer.weight().value().data()[0];
        let mut sgd = Sgd::new(0.1).unwrap().with_momentum(0.9);
        let input = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        let grad = Tensor::from_vec(1, 1, vec![1.0]).unwrap();

        layer.backward(&input, &grad).unwrap();
        sgd.step(&mut layer).unwrap();
        let first = layer.weight().value().data()[0];
        assert!((start - first - 0.1).abs() < 1e-6);

        layer.backward(&input, &grad).unwrap();
        sgd.step(&mut layer).unwrap();
        let second = layer.weight().value().data()[0];
        assert!((first - second - 0.19).abs() < 1e-5);
    }

    #[test]
    fn weight_decay_shrinks_weights_without_signal() {
        let mut layer = Linear::with_seed("fc", 2, 2, Some(4)).unwrap();
        let before = layer.weight().value().squared_l2_norm();
        let input = Tensor::zeros(1, 2).unwrap();
        let grad = Tensor::zeros(1, 2).unwrap();
        layer.backward(&input, &grad).unwrap();
        let mut sgd = Sgd::new(0.5).unwrap().with_weight_decay(0.1);
        sgd.step(&mut layer).unwrap();
        assert!(layer.weight().value().squared_l2_norm() < before);
    }
}
