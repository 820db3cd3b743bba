// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Logit-space projected gradient ascent.
//!
//! Each pixel keeps a vector of logits over the `k` levels. A masked,
//! temperature-scaled softmax turns the logits into a distribution over the
//! reachable buckets, and the distribution is cumulated into a relaxed
//! thermometer code. Every step ascends the loss with a signed step on the
//! logits and then sharpens the softmax by dividing the temperature by `δ`.

use super::band::{reachable_band, BucketBand};
use super::{check_epsilon, check_labels, Attacker, GradientOracle};
use crate::code::LevelCode;
use crate::error::{EncodingError, EncodingResult};
use crate::image::ImageBatch;
use crate::quantize::check_levels;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use thermo_config::determinism;
use thermo_tensor::Tensor;
use tracing::debug;

/// Hyperparameters of [`LsPga`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LsPgaConfig {
    /// Intensity budget.
    pub epsilon: f32,
    /// Number of ascent steps.
    pub steps: usize,
    /// Temperature decay per step (`T ← T / δ`).
    pub delta: f32,
    /// Signed step size on the logits.
    pub xi: f32,
    /// Seed for the logit initialisation; `None` defers to the determinism config.
    pub seed: Option<u64>,
}

impl Default for LsPgaConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.032,
            steps: 7,
            delta: 1.2,
            xi: 1.5,
            seed: None,
        }
    }
}

#[derive(Debug)]
pub struct LsPga {
    levels: usize,
    config: LsPgaConfig,
    rng: StdRng,
}

impl LsPga {
    pub fn new(levels: usize, config: LsPgaConfig) -> EncodingResult<Self> {
        check_levels(levels)?;
        check_epsilon(config.epsilon)?;
        if !config.delta.is_finite() || config.delta <= 0.0 {
            return Err(EncodingError::InvalidAttackParameter {
                name: "delta",
                value: config.delta,
            });
        }
        if !config.xi.is_finite() || config.xi < 0.0 {
            return Err(EncodingError::InvalidAttackParameter {
                name: "xi",
                value: config.xi,
            });
        }
        let rng = determinism::rng_from_optional(config.seed, "thermo-encoding/attack/lspga");
        Ok(Self { levels, config, rng })
    }

    pub fn config(&self) -> &LsPgaConfig {
        &self.config
    }

    fn initial_logits(&mut self, rows: usize, cols: usize) -> EncodingResult<Tensor> {
        let data = (0..rows * cols)
            .map(|_| {
                let sample: f32 = StandardNormal.sample(&mut self.rng);
                sample
            })
            .collect();
        Ok(Tensor::from_vec(rows, cols, data)?)
    }
}

impl Attacker for LsPga {
    fn attack(
        &mut self,
        oracle: &dyn GradientOracle,
        images: &ImageBatch,
        labels: &[usize],
    ) -> EncodingResult<Vec<LevelCode>> {
        check_labels(images, labels)?;
        let cols = self.levels * images.plane_len();
        let bands = images
            .planes()?
            .iter()
            .map(|plane| reachable_band(plane, self.levels, self.config.epsilon))
            .collect::<EncodingResult<Vec<_>>>()?;
        let mut logits = Vec::with_capacity(bands.len());
        for _ in &bands {
            logits.push(self.initial_logits(images.batch(), cols)?);
        }

        let mut temperature = 1.0f32;
        let mut weights = masked_softmax_all(&bands, &logits, temperature)?;
        for step in 0..self.config.steps {
            let codes = project_all(&bands, &weights)?;
            let (loss, gradients) = oracle.loss_and_gradient(&codes, labels)?;
            if gradients.len() != bands.len() {
                return Err(EncodingError::ChannelMismatch {
                    expected: bands.len(),
                    got: gradients.len(),
                });
            }
            debug!(step, loss, temperature, "ls-pga step");
            for ((band, u), (z, grad)) in bands
                .iter()
                .zip(logits.iter_mut())
                .zip(weights.iter().zip(&gradients))
            {
                let grad_u = logit_gradient(band, z, grad, temperature)?;
                for (value, g) in u.data_mut().iter_mut().zip(grad_u) {
                    *value += self.config.xi * signum(g);
                }
            }
            temperature /= self.config.delta;
            weights = masked_softmax_all(&bands, &logits, temperature)?;
        }
        project_all(&bands, &weights)
    }

    fn epsilon(&self) -> f32 {
        self.config.epsilon
    }

    fn levels(&self) -> usize {
        self.levels
    }
}

fn signum(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn project_all(bands: &[BucketBand], weights: &[Tensor]) -> EncodingResult<Vec<LevelCode>> {
    bands
        .iter()
        .zip(weights)
        .map(|(band, z)| band.project(z))
        .collect()
}

fn masked_softmax_all(
    bands: &[BucketBand],
    logits: &[Tensor],
    temperature: f32,
) -> EncodingResult<Vec<Tensor>> {
    bands
        .iter()
        .zip(logits)
        .map(|(band, u)| masked_softmax(band, u, temperature))
        .collect()
}

/// Softmax of `u / T` over the reachable levels `lo..=hi` of every pixel;
/// unreachable levels get zero mass.
fn masked_softmax(band: &BucketBand, logits: &Tensor, temperature: f32) -> EncodingResult<Tensor> {
    let plane_len = band.plane_len();
    let cols = logits.shape().1;
    let mut out = vec![0.0f32; logits.len()];
    for (image, (dst, src)) in out
        .chunks_mut(cols)
        .zip(logits.data().chunks(cols))
        .enumerate()
    {
        for pixel in 0..plane_len {
            let (lo, hi) = band.bounds(image, pixel);
            let at = |level: usize| level * plane_len + pixel;
            let max = (lo..=hi)
                .map(|level| src[at(level)] / temperature)
                .fold(f32::NEG_INFINITY, f32::max);
            let mut total = 0.0f32;
            for level in lo..=hi {
                let e = (src[at(level)] / temperature - max).exp();
                dst[at(level)] = e;
                total += e;
            }
            for level in lo..=hi {
                dst[at(level)] /= total;
            }
        }
    }
    Ok(Tensor::from_vec(logits.shape().0, cols, out)?)
}

/// Back-propagates `∂L/∂code` through the band projection and the softmax.
///
/// Inside the band `code[i] = Σ_{j=lo..=i} z[j]` for `i < hi`, so
/// `∂L/∂z[j] = Σ_{i=j..hi} ∂L/∂code[i]`; the softmax Jacobian then gives
/// `∂L/∂u[j] = z[j] (∂L/∂z[j] − Σ z ∂L/∂z) / T`.
fn logit_gradient(
    band: &BucketBand,
    weights: &Tensor,
    grad_code: &Tensor,
    temperature: f32,
) -> EncodingResult<Vec<f32>> {
    if grad_code.shape() != weights.shape() {
        return Err(EncodingError::Tensor(thermo_tensor::TensorError::ShapeMismatch {
            left: weights.shape(),
            right: grad_code.shape(),
        }));
    }
    let plane_len = band.plane_len();
    let cols = weights.shape().1;
    let mut out = vec![0.0f32; weights.len()];
    let mut grad_z = vec![0.0f32; band.levels()];
    for (image, ((dst, z), g)) in out
        .chunks_mut(cols)
        .zip(weights.data().chunks(cols))
        .zip(grad_code.data().chunks(cols))
        .enumerate()
    {
        for pixel in 0..plane_len {
            let (lo, hi) = band.bounds(image, pixel);
            let at = |level: usize| level * plane_len + pixel;
            let mut acc = 0.0f32;
            grad_z[hi] = 0.0;
            for level in (lo..hi).rev() {
                acc += g[at(level)];
                grad_z[level] = acc;
            }
            let mean: f32 = (lo..=hi).map(|level| z[at(level)] * grad_z[level]).sum();
            for level in lo..=hi {
                dst[at(level)] = z[at(level)] * (grad_z[level] - mean) / temperature;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::within_budget;

    /// Loss = Σ code; gradient of one everywhere, so the ascent pushes mass
    /// towards the lowest reachable bucket.
    struct SumOracle;

    impl GradientOracle for SumOracle {
        fn loss_and_gradient(
            &self,
            codes: &[LevelCode],
            _labels: &[usize],
        ) -> EncodingResult<(f32, Vec<Tensor>)> {
            let loss = codes
                .iter()
                .map(|code| code.tensor().data().iter().sum::<f32>())
                .sum();
            let grads = codes
                .iter()
                .map(|code| {
                    let (rows, cols) = code.tensor().shape();
                    Tensor::filled(rows, cols, 1.0)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((loss, grads))
        }
    }

    fn grey_batch() -> ImageBatch {
        ImageBatch::from_vec(2, 3, 2, 2, vec![0.5; 24]).unwrap()
    }

    #[test]
    fn rejects_bad_parameters() {
        let bad = LsPgaConfig {
            delta: 0.0,
            ..LsPgaConfig::default()
        };
        assert!(LsPga::new(15, bad).is_err());
        assert!(LsPga::new(0, LsPgaConfig::default()).is_err());
        let negative = LsPgaConfig {
            epsilon: -0.1,
            ..LsPgaConfig::default()
        };
        assert!(LsPga::new(15, negative).is_err());
    }

    #[test]
    fn output_stays_inside_budget() {
        let config = LsPgaConfig {
            epsilon: 0.2,
            seed: Some(3),
            ..LsPgaConfig::default()
        };
        let mut attack = LsPga::new(10, config).unwrap();
        let images = grey_batch();
        let codes = attack.attack(&SumOracle, &images, &[0, 1]).unwrap();
        assert_eq!(codes.len(), 3);
        for (code, plane) in codes.iter().zip(images.planes().unwrap()) {
            assert!(within_budget(&plane, code, 0.2).unwrap());
        }
    }

    #[test]
    fn ascent_increases_the_loss() {
        let config = LsPgaConfig {
            epsilon: 0.2,
            steps: 10,
            seed: Some(11),
            ..LsPgaConfig::default()
        };
        let images = grey_batch();
        let labels = [0, 1];
        let mut idle = LsPga::new(10, LsPgaConfig { steps: 0, ..config }).unwrap();
        let start = idle.attack(&SumOracle, &images, &labels).unwrap();
        let mut attack = LsPga::new(10, config).unwrap();
        let end = attack.attack(&SumOracle, &images, &labels).unwrap();
        let (before, _) = SumOracle.loss_and_gradient(&start, &labels).unwrap();
        let (after, _) = SumOracle.loss_and_gradient(&end, &labels).unwrap();
        assert!(after > before, "{after} <= {before}");
    }

    #[test]
    fn zero_budget_returns_clean_code() {
        let config = LsPgaConfig {
            epsilon: 0.0,
            seed: Some(5),
            ..LsPgaConfig::default()
        };
        let mut attack = LsPga::new(15, config).unwrap();
        let images = grey_batch();
        let codes = attack.attack(&SumOracle, &images, &[0, 1]).unwrap();
        let encoder = crate::encoder::ThermometerEncoder::new(15).unwrap();
        let clean = encoder
            .encode_batch(&images, crate::encoder::EncodingMode::Thermometer)
            .unwrap();
        assert_eq!(codes, clean);
    }

    #[test]
    fn label_count_must_match() {
        let mut attack = LsPga::new(10, LsPgaConfig::default()).unwrap();
        assert!(matches!(
            attack.attack(&SumOracle, &grey_batch(), &[0]),
            Err(EncodingError::LabelMismatch { labels: 1, batch: 2 })
        ));
    }
}
