// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::band::reachable_band;
use super::{check_epsilon, check_labels, Attacker, GradientOracle};
use crate::code::LevelCode;
use crate::error::EncodingResult;
use crate::image::ImageBatch;
use crate::quantize::check_levels;
use rand::rngs::StdRng;
use rand::Rng;
use thermo_config::determinism;
use thermo_tensor::Tensor;

/// Gradient-free attacker that returns a random point of the bucket band.
///
/// Ignores the oracle entirely; useful as a baseline and for exercising
/// the training loop without paying for a gradient search.
#[derive(Debug)]
pub struct NoiseAttacker {
    levels: usize,
    epsilon: f32,
    rng: StdRng,
}

impl NoiseAttacker {
    pub fn new(levels: usize, epsilon: f32, seed: Option<u64>) -> EncodingResult<Self> {
        check_levels(levels)?;
        check_epsilon(epsilon)?;
        Ok(Self {
            levels,
            epsilon,
            rng: determinism::rng_from_optional(seed, "thermo-encoding/attack/noise"),
        })
    }
}

impl Attacker for NoiseAttacker {
    fn attack(
        &mut self,
        _oracle: &dyn GradientOracle,
        images: &ImageBatch,
        labels: &[usize],
    ) -> EncodingResult<Vec<LevelCode>> {
        check_labels(images, labels)?;
        let cols = self.levels * images.plane_len();
        images
            .planes()?
            .iter()
            .map(|plane| {
                let band = reachable_band(plane, self.levels, self.epsilon)?;
                let weights =
                    Tensor::from_fn(images.batch(), cols, |_, _| self.rng.gen_range(0.0..0.5))?;
                band.project(&weights)
            })
            .collect()
    }

    fn epsilon(&self) -> f32 {
        self.epsilon
    }

    fn levels(&self) -> usize {
        self.levels
    }
}
