// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::optim::Sgd;
use crate::{PureResult, TensorError};

/// Decays the learning rate by `gamma` every `step_size` epochs:
/// `lr(epoch) = base_lr · gamma^(epoch / step_size)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLr {
    base_lr: f32,
    step_size: usize,
    gamma: f32,
    last_epoch: usize,
}

impl StepLr {
    /// Binds the schedule to the optimiser's current learning rate.
    pub fn new(optimizer: &Sgd, step_size: usize, gamma: f32) -> PureResult<Self> {
        if step_size == 0 {
            return Err(TensorError::InvalidValue {
                label: "step_lr_step_size",
            });
        }
        if !(gamma > 0.0 && gamma.is_finite()) {
            return Err(TensorError::InvalidValue {
                label: "step_lr_gamma",
            });
        }
        Ok(Self {
            base_lr: optimizer.learning_rate(),
            step_size,
            gamma,
            last_epoch: 0,
        })
    }

    /// Number of completed `step` calls.
    pub fn last_epoch(&self) -> usize {
        self.last_epoch
    }

    /// Learning rate the schedule prescribes for the current epoch. Long runs
    /// bottom out at the smallest positive `f32` instead of reaching zero.
    pub fn current_lr(&self) -> f32 {
        let decays = i32::try_from(self.last_epoch / self.step_size).unwrap_or(i32::MAX);
        let lr = f64::from(self.base_lr) * f64::from(self.gamma).powi(decays);
        (lr as f32).clamp(f32::MIN_POSITIVE, f32::MAX)
    }

    /// Advances one epoch and pushes the new rate into the optimiser.
    pub fn step(&mut self, optimizer: &mut Sgd) -> PureResult<()> {
        self.last_epoch += 1;
        optimizer.set_learning_rate(self.current_lr())
    }

    /// Replays `epochs` steps, used when resuming a run mid-way.
    pub fn fast_forward(&mut self, optimizer: &mut Sgd, epochs: usize) -> PureResult<()> {
        self.last_epoch += epochs;
        optimizer.set_learning_rate(self.current_lr())
    }
}
