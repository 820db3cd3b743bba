// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor};

/// Sequential container that mirrors `nn.Sequential`.
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Module + Send + Sync>>,
}

impl core::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Sequential(num_layers={})", self.layers.len())
    }
}

impl Sequential {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a new layer to the sequence.
    pub fn push<M>(&mut self, layer: M)
    where
        M: Module + Send + Sync + 'static,
    {
        self.layers.push(Box::new(layer));
    }

    /// Returns the number of layers registered in the container.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` when the container does not hold any layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    // Inputs seen by each layer during a forward pass; entry 0 is `input`.
    fn layer_inputs(&self, input: &Tensor) -> PureResult<Vec<Tensor>> {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut current = input.clone();
        for layer in &self.layers {
            let next = layer.forward(&current)?;
            inputs.push(current);
            current = next;
        }
        Ok(inputs)
    }
}

impl Module for Sequential {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let mut activ = input.clone();
        for layer in &self.layers {
            activ = layer.forward(&activ)?;
        }
        Ok(activ)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let inputs = self.layer_inputs(input)?;
        let mut grad = grad_output.clone();
        for (layer, layer_input) in self.layers.iter_mut().zip(inputs.iter()).rev() {
            grad = layer.backward(layer_input, &grad)?;
        }
        Ok(grad)
    }

    fn backward_input(&self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let inputs = self.layer_inputs(input)?;
        let mut grad = grad_output.clone();
        for (layer, layer_input) in self.layers.iter().zip(inputs.iter()).rev() {
            grad = layer.backward_input(layer_input, &grad)?;
        }
        Ok(grad)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for layer in &self.layers {
            layer.visit_parameters(visitor)?;
        }
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for layer in &mut self.layers {
            layer.visit_parameters_mut(visitor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{linear::Linear, Relu};

    fn two_layer() -> Sequential {
        let mut seq = Sequential::new();
        seq.push(Linear::with_seed("l1", 2, 3, Some(1)).unwrap());
        seq.push(Relu::new());
        seq.push(Linear::with_seed("l2", 3, 1, Some(2)).unwrap());
        seq
    }

    #[test]
    fn sequential_forward_and_backward() {
        let mut seq = two_layer();
        let input = Tensor::from_vec(1, 2, vec![0.5, -0.1]).unwrap();
        let target = Tensor::from_vec(1, 1, vec![0.2]).unwrap();
        let output = seq.forward(&input).unwrap();
        let grad_out = output.sub(&target).unwrap();
        let _ = seq.backward(&input, &grad_out).unwrap();
        seq.apply_step(0.01).unwrap();
        let new_output = seq.forward(&input).unwrap();
        assert_ne!(output, new_output);
        assert_eq!(seq.state_dict().unwrap().len(), 4);
    }

    #[test]
    fn input_gradient_matches_finite_difference() {
        let seq = two_layer();
        let input = Tensor::from_vec(1, 2, vec![0.3, 0.7]).unwrap();
        let ones = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        let grad = seq.backward_input(&input, &ones).unwrap();
        let h = 1e-3f32;
        for idx in 0..2 {
            let mut plus = input.clone();
            plus.data_mut()[idx] += h;
            let mut minus = input.clone();
            minus.data_mut()[idx] -= h;
            let numeric = (seq.forward(&plus).unwrap().data()[0]
                - seq.forward(&minus).unwrap().data()[0])
                / (2.0 * h);
            assert!((numeric - grad.data()[idx]).abs() < 1e-2);
        }
    }
}
