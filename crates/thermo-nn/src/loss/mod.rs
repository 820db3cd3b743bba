// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

mod softmax_cross_entropy;

use crate::{PureResult, Tensor, TensorError};

pub use softmax_cross_entropy::SoftmaxCrossEntropy;

/// Trait implemented by differentiable losses that operate directly on
/// tensors.
pub trait Loss {
    /// Computes the loss value for the given predictions and targets.
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor>;

    /// Returns the gradient of the loss with respect to the predictions.
    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor>;
}

/// Expands integer class labels into a `(labels.len(), classes)` one-hot tensor.
pub fn one_hot_targets(labels: &[usize], classes: usize) -> PureResult<Tensor> {
    if labels.is_empty() {
        return Err(TensorError::EmptyInput("one_hot_targets"));
    }
    let mut data = vec![0.0f32; labels.len() * classes];
    for (row, &label) in labels.iter().enumerate() {
        if label >= classes {
            return Err(TensorError::InvalidValue {
                label: "class_label_out_of_range",
            });
        }
        data[row * classes + label] = 1.0;
    }
    Tensor::from_vec(labels.len(), classes, data)
}
