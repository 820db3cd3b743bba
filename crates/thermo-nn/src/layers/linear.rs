// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};
use thermo_config::determinism;

/// Fully-connected layer `y = x·W + b` with `W: (input_dim, output_dim)`.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
}

impl Linear {
    /// Creates a layer with LeCun-normal weights. The seed is derived from the
    /// layer name when deterministic execution is enabled.
    pub fn new(name: impl Into<String>, input_dim: usize, output_dim: usize) -> PureResult<Self> {
        let name = name.into();
        let cfg = determinism::config();
        let seed = cfg.enabled.then(|| cfg.seed_for(&name));
        Self::with_seed(name, input_dim, output_dim, seed)
    }

    /// Creates a layer whose weights are drawn from an explicit seed.
    pub fn with_seed(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: output_dim,
            });
        }
        let name = name.into();
        let std = (1.0 / input_dim as f32).sqrt();
        let weights = Tensor::random_normal(input_dim, output_dim, 0.0, std, seed)?;
        let bias = Tensor::zeros(1, output_dim)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weights),
            bias: Parameter::new(format!("{name}::bias"), bias),
        })
    }

    /// Returns a reference to the weight parameter.
    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    /// Returns a reference to the bias parameter.
    pub fn bias(&self) -> &Parameter {
        &self.bias
    }

    /// Number of input features.
    pub fn input_dim(&self) -> usize {
        self.weight.value().shape().0
    }

    /// Number of output features.
    pub fn output_dim(&self) -> usize {
        self.weight.value().shape().1
    }

    fn check_grad(input: &Tensor, grad_output: &Tensor) -> PureResult<()> {
        if input.shape().0 != grad_output.shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: grad_output.shape(),
            });
        }
        Ok(())
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if input.shape().1 != self.weight.value().shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: self.weight.value().shape(),
            });
        }
        let mut out = input.matmul(self.weight.value())?;
        out.add_row_inplace(self.bias.value().data())?;
        Ok(out)
    }

    // The loss already averages over the batch, so gradients are summed here.
    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        Self::check_grad(input, grad_output)?;
        let grad_w = input.transpose().matmul(grad_output)?;
        self.weight.accumulate_euclidean(&grad_w)?;

        let summed = grad_output.sum_axis0();
        let grad_b = Tensor::from_vec(1, summed.len(), summed)?;
        self.bias.accumulate_euclidean(&grad_b)?;

        self.backward_input(input, grad_output)
    }

    fn backward_input(&self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        Self::check_grad(input, grad_output)?;
        grad_output.matmul(&self.weight.value().transpose())
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_forward_matches_manual() {
        let layer = Linear::with_seed("fc", 3, 2, Some(5)).unwrap();
        let input = Tensor::from_vec(1, 3, vec![1.0, -2.0, 0.5]).unwrap();
        let output = layer.forward(&input).unwrap();
        let mut expected = input.matmul(layer.weight.value()).unwrap();
        expected.add_row_inplace(layer.bias.value().data()).unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn backward_input_leaves_gradients_untouched() {
        let mut layer = Linear::with_seed("fc", 4, 3, Some(9)).unwrap();
        let input =
            Tensor::from_vec(2, 4, vec![0.1, 0.2, -0.3, 0.4, -0.5, 0.6, 0.7, -0.8]).unwrap();
        let grad = Tensor::from_vec(2, 3, vec![1.0, 0.0, -1.0, 0.5, 0.5, 0.5]).unwrap();
        let read_only = layer.backward_input(&input, &grad).unwrap();
        assert!(layer.weight().gradient().is_none());
        let accumulated = layer.backward(&input, &grad).unwrap();
        assert_eq!(read_only, accumulated);
        assert_eq!(layer.weight().gradient().unwrap().shape(), (4, 3));
        assert_eq!(layer.bias().gradient().unwrap().data(), &[1.5, 0.5, -0.5]);
    }

    #[test]
    fn gradient_step_reduces_squared_error() {
        let mut layer = Linear::with_seed("fc", 2, 1, Some(1)).unwrap();
        let input = Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        let target = Tensor::from_vec(1, 1, vec![0.5]).unwrap();
        let before = layer.forward(&input).unwrap().sub(&target).unwrap();
        let _ = layer.backward(&input, &before).unwrap();
        layer.apply_step(0.1).unwrap();
        let after = layer.forward(&input).unwrap().sub(&target).unwrap();
        assert!(after.squared_l2_norm() < before.squared_l2_norm());
    }
}
