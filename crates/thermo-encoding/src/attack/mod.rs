// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Adversarial search over the relaxed thermometer code.
//!
//! The training loop only depends on [`Attacker`]: given raw images and their
//! labels it returns one relaxed thermometer code per channel, each inside
//! the perturbation budget of the clean encoding. Attackers see the model
//! through a [`GradientOracle`], a shared borrow that can evaluate the loss
//! and its input gradient but cannot touch the parameters.
//!
//! The budget is expressed in bucket space. For intensity `x` and budget `ε`
//! a pixel may move anywhere between the buckets of `max(x − ε, 0)` and
//! `min(x + ε, 1)`; see [`BucketBand`] and [`within_budget`].

mod band;
mod lspga;
mod noise;

pub use band::{reachable_band, within_budget, BucketBand};
pub use lspga::{LsPga, LsPgaConfig};
pub use noise::NoiseAttacker;

use crate::code::LevelCode;
use crate::error::{EncodingError, EncodingResult};
use crate::image::ImageBatch;
use thermo_tensor::Tensor;

/// Read-only view of a classifier and its loss.
pub trait GradientOracle {
    /// Evaluates the mean loss of `codes` (one per channel) against `labels`
    /// and returns it with `∂loss/∂code` for every channel, in order.
    fn loss_and_gradient(
        &self,
        codes: &[LevelCode],
        labels: &[usize],
    ) -> EncodingResult<(f32, Vec<Tensor>)>;
}

/// Produces budget-respecting adversarial codes for a batch.
///
/// The search is best effort: a weak result is still a result, and errors
/// are reserved for malformed inputs or a failing oracle.
pub trait Attacker {
    fn attack(
        &mut self,
        oracle: &dyn GradientOracle,
        images: &ImageBatch,
        labels: &[usize],
    ) -> EncodingResult<Vec<LevelCode>>;

    /// Perturbation budget in intensity units.
    fn epsilon(&self) -> f32;

    /// Level count of the codes this attacker produces.
    fn levels(&self) -> usize;
}

pub(crate) fn check_labels(images: &ImageBatch, labels: &[usize]) -> EncodingResult<()> {
    if labels.len() != images.batch() {
        return Err(EncodingError::LabelMismatch {
            labels: labels.len(),
            batch: images.batch(),
        });
    }
    Ok(())
}

pub(crate) fn check_epsilon(epsilon: f32) -> EncodingResult<()> {
    if !epsilon.is_finite() || epsilon < 0.0 {
        return Err(EncodingError::InvalidAttackParameter {
            name: "epsilon",
            value: epsilon,
        });
    }
    Ok(())
}
