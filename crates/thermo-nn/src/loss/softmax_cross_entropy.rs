// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::Loss;
use crate::{PureResult, Tensor, TensorError};

/// Cross entropy over raw logits (softmax folded in), averaged over the batch.
/// Targets are one-hot rows.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxCrossEntropy {
    epsilon: f32,
}

impl Default for SoftmaxCrossEntropy {
    fn default() -> Self {
        Self { epsilon: 1e-12 }
    }
}

impl SoftmaxCrossEntropy {
    /// Creates the loss with the default probability floor.
    pub fn new() -> Self {
        Self::default()
    }

    fn check(prediction: &Tensor, target: &Tensor) -> PureResult<()> {
        if prediction.shape() != target.shape() {
            return Err(TensorError::ShapeMismatch {
                left: prediction.shape(),
                right: target.shape(),
            });
        }
        Ok(())
    }
}

impl Loss for SoftmaxCrossEntropy {
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        Self::check(prediction, target)?;
        let probs = prediction.row_softmax()?;
        let rows = prediction.shape().0;
        let mut sum = 0.0f32;
        for (p, t) in probs.data().iter().zip(target.data()) {
            if *t != 0.0 {
                sum -= t * p.max(self.epsilon).ln();
            }
        }
        Tensor::from_vec(1, 1, vec![sum / rows as f32])
    }

    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        Self::check(prediction, target)?;
        let rows = prediction.shape().0;
        prediction
            .row_softmax()?
            .sub(target)?
            .scale(1.0 / rows as f32)
    }
}
