// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Channel-aware classifier over thermometer codes.

use thermo_encoding::{EncodingError, EncodingResult, GradientOracle, LevelCode};
use thermo_nn::{one_hot_targets, Linear, Loss, Module, Parameter, Relu, Sequential, SoftmaxCrossEntropy};
use thermo_tensor::{PureResult, Tensor, TensorError};

/// CIFAR-10 class count.
pub const NUM_CLASSES: usize = 10;

/// One linear stem per colour channel, summed into a shared hidden layer,
/// followed by `Relu → Linear → Relu → Linear`.
///
/// As a [`Module`] the network consumes the per-channel codes concatenated
/// column-wise: `(N, C·k·H·W)`.
#[derive(Debug)]
pub struct ThermoNet {
    stems: Vec<Linear>,
    head: Sequential,
    levels: usize,
    plane_len: usize,
    classes: usize,
}

impl ThermoNet {
    pub fn new(
        channels: usize,
        levels: usize,
        plane_len: usize,
        hidden: usize,
        classes: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if channels == 0 {
            return Err(TensorError::EmptyInput("channels"));
        }
        let layer_seed = |offset: u64| seed.map(|s| s.wrapping_add(offset));
        let stems = (0..channels)
            .map(|c| {
                Linear::with_seed(
                    format!("stem{c}"),
                    levels * plane_len,
                    hidden,
                    layer_seed(c as u64),
                )
            })
            .collect::<PureResult<Vec<_>>>()?;
        let mut head = Sequential::new();
        head.push(Relu::new());
        head.push(Linear::with_seed("hidden", hidden, hidden, layer_seed(100))?);
        head.push(Relu::new());
        head.push(Linear::with_seed("classifier", hidden, classes, layer_seed(101))?);
        Ok(Self {
            stems,
            head,
            levels,
            plane_len,
            classes,
        })
    }

    pub fn channels(&self) -> usize {
        self.stems.len()
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    fn code_width(&self) -> usize {
        self.levels * self.plane_len
    }

    /// Concatenates per-channel codes into the module input.
    pub fn assemble(&self, codes: &[LevelCode]) -> EncodingResult<Tensor> {
        if codes.len() != self.channels() {
            return Err(EncodingError::ChannelMismatch {
                expected: self.channels(),
                got: codes.len(),
            });
        }
        let tensors: Vec<Tensor> = codes.iter().map(|code| code.tensor().clone()).collect();
        Ok(Tensor::cat_cols(&tensors)?)
    }

    fn split(&self, input: &Tensor) -> PureResult<Vec<Tensor>> {
        let widths = vec![self.code_width(); self.channels()];
        input.split_cols(&widths)
    }

    fn hidden(&self, parts: &[Tensor]) -> PureResult<Tensor> {
        let mut sum = self.stems[0].forward(&parts[0])?;
        for (stem, part) in self.stems.iter().zip(parts).skip(1) {
            sum.add_scaled(&stem.forward(part)?, 1.0)?;
        }
        Ok(sum)
    }
}

impl Module for ThermoNet {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let parts = self.split(input)?;
        self.head.forward(&self.hidden(&parts)?)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let parts = self.split(input)?;
        let hidden = self.hidden(&parts)?;
        let grad_hidden = self.head.backward(&hidden, grad_output)?;
        let grads = self
            .stems
            .iter_mut()
            .zip(&parts)
            .map(|(stem, part)| stem.backward(part, &grad_hidden))
            .collect::<PureResult<Vec<_>>>()?;
        Tensor::cat_cols(&grads)
    }

    fn backward_input(&self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let parts = self.split(input)?;
        let hidden = self.hidden(&parts)?;
        let grad_hidden = self.head.backward_input(&hidden, grad_output)?;
        let grads = self
            .stems
            .iter()
            .zip(&parts)
            .map(|(stem, part)| stem.backward_input(part, &grad_hidden))
            .collect::<PureResult<Vec<_>>>()?;
        Tensor::cat_cols(&grads)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for stem in &self.stems {
            stem.visit_parameters(visitor)?;
        }
        self.head.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for stem in &mut self.stems {
            stem.visit_parameters_mut(visitor)?;
        }
        self.head.visit_parameters_mut(visitor)
    }
}

/// Shared borrow of the classifier handed to attackers. Holding it keeps the
/// network frozen for as long as the attack runs.
pub struct ClassifierOracle<'a> {
    model: &'a ThermoNet,
    loss: SoftmaxCrossEntropy,
}

impl<'a> ClassifierOracle<'a> {
    pub fn new(model: &'a ThermoNet, loss: SoftmaxCrossEntropy) -> Self {
        Self { model, loss }
    }
}

impl GradientOracle for ClassifierOracle<'_> {
    fn loss_and_gradient(
        &self,
        codes: &[LevelCode],
        labels: &[usize],
    ) -> EncodingResult<(f32, Vec<Tensor>)> {
        let input = self.model.assemble(codes)?;
        let logits = self.model.forward(&input)?;
        let targets = one_hot_targets(labels, self.model.classes())?;
        let mut loss = self.loss;
        let value = loss.forward(&logits, &targets)?.data()[0];
        let grad_logits = loss.backward(&logits, &targets)?;
        let grad_input = self.model.backward_input(&input, &grad_logits)?;
        Ok((value, self.model.split(&grad_input)?))
    }
}
