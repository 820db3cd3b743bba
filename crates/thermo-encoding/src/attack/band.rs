// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::code::{BucketTensor, LevelCode};
use crate::error::{EncodingError, EncodingResult};
use crate::quantize::{check_levels, quantize};
use thermo_tensor::Tensor;

const TOLERANCE: f32 = 1e-6;

/// Per-pixel range of buckets reachable within an intensity budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketBand {
    lower: BucketTensor,
    upper: BucketTensor,
    levels: usize,
}

/// Bucket band of an `(N, H·W)` channel plane under budget `epsilon`.
pub fn reachable_band(plane: &Tensor, levels: usize, epsilon: f32) -> EncodingResult<BucketBand> {
    check_levels(levels)?;
    super::check_epsilon(epsilon)?;
    let (rows, cols) = plane.shape();
    let shifted = |delta: f32| -> EncodingResult<Tensor> {
        let data = plane
            .data()
            .iter()
            .map(|&x| (x + delta).clamp(0.0, 1.0))
            .collect();
        Ok(Tensor::from_vec(rows, cols, data)?)
    };
    // clamp keeps NaN, so non-finite pixels still fail inside quantize
    let lower = quantize(&shifted(-epsilon)?, levels)?;
    let upper = quantize(&shifted(epsilon)?, levels)?;
    Ok(BucketBand {
        lower,
        upper,
        levels,
    })
}

/// Whether `code` is reachable from the clean `plane` under `epsilon`.
///
/// Every pixel profile must stay in `[0, 1]`, be non-decreasing along the
/// level axis, be `0` below the band and `1` from its upper edge on.
pub fn within_budget(plane: &Tensor, code: &LevelCode, epsilon: f32) -> EncodingResult<bool> {
    let band = reachable_band(plane, code.levels(), epsilon)?;
    band.check_shape(code)?;
    for image in 0..band.batch() {
        let row = code.tensor().row(image)?;
        for pixel in 0..band.plane_len() {
            let (lo, hi) = band.bounds(image, pixel);
            let mut previous = 0.0f32;
            for level in 0..band.levels {
                let value = row[code.column(level, pixel)];
                if !(-TOLERANCE..=1.0 + TOLERANCE).contains(&value) || value + TOLERANCE < previous {
                    return Ok(false);
                }
                if level < lo && value > TOLERANCE {
                    return Ok(false);
                }
                if level >= hi && value < 1.0 - TOLERANCE {
                    return Ok(false);
                }
                previous = value;
            }
        }
    }
    Ok(true)
}

impl BucketBand {
    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn batch(&self) -> usize {
        self.lower.batch()
    }

    pub fn plane_len(&self) -> usize {
        self.lower.plane_len()
    }

    /// Lowest and highest reachable bucket of one pixel.
    pub fn bounds(&self, image: usize, pixel: usize) -> (usize, usize) {
        let flat = image * self.plane_len() + pixel;
        (self.lower.as_slice()[flat], self.upper.as_slice()[flat])
    }

    /// Turns non-negative per-level weights into a thermometer code that
    /// lies inside the band.
    ///
    /// Levels below the band are `0`, levels from the upper edge on are `1`
    /// and the levels in between carry the clamped running sum of the
    /// weights. Weights outside the band are ignored.
    pub fn project(&self, weights: &Tensor) -> EncodingResult<LevelCode> {
        let plane_len = self.plane_len();
        let cols = self.levels * plane_len;
        if weights.shape() != (self.batch(), cols) {
            return Err(EncodingError::Layout {
                what: "band weights",
                expected: cols,
                got: weights.shape().1,
            });
        }
        let mut data = vec![0.0f32; self.batch() * cols];
        for (image, (out, source)) in data
            .chunks_mut(cols)
            .zip(weights.data().chunks(cols))
            .enumerate()
        {
            for pixel in 0..plane_len {
                let (lo, hi) = self.bounds(image, pixel);
                let mut running = 0.0f32;
                for level in lo..hi {
                    let col = level * plane_len + pixel;
                    running += source[col].max(0.0);
                    out[col] = running.clamp(0.0, 1.0);
                }
                for level in hi..self.levels {
                    out[level * plane_len + pixel] = 1.0;
                }
            }
        }
        let tensor = Tensor::from_vec(self.batch(), cols, data)?;
        LevelCode::new(tensor, self.levels, plane_len)
    }

    fn check_shape(&self, code: &LevelCode) -> EncodingResult<()> {
        if code.batch() != self.batch() || code.plane_len() != self.plane_len() {
            return Err(EncodingError::Layout {
                what: "code against clean plane",
                expected: self.batch() * self.plane_len(),
                got: code.batch() * code.plane_len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ThermometerEncoder;

    #[test]
    fn band_widens_with_epsilon() {
        let plane = Tensor::from_vec(1, 3, vec![0.0, 0.5, 1.0]).unwrap();
        let tight = reachable_band(&plane, 10, 0.0).unwrap();
        assert_eq!(tight.bounds(0, 1), (4, 4));
        let wide = reachable_band(&plane, 10, 0.15).unwrap();
        assert_eq!(wide.bounds(0, 0), (0, 1));
        assert_eq!(wide.bounds(0, 1), (3, 6));
        assert_eq!(wide.bounds(0, 2), (8, 9));
    }

    #[test]
    fn clean_code_is_within_budget() {
        let encoder = ThermometerEncoder::new(15).unwrap();
        let plane = Tensor::from_vec(2, 2, vec![0.0, 0.33, 0.71, 1.0]).unwrap();
        let code = encoder.tempencoding(&plane).unwrap();
        assert!(within_budget(&plane, &code, 0.0).unwrap());
        assert!(within_budget(&plane, &code, 0.032).unwrap());
    }

    #[test]
    fn escaping_the_band_is_detected() {
        let encoder = ThermometerEncoder::new(10).unwrap();
        let plane = Tensor::filled(1, 1, 0.05).unwrap();
        let far = Tensor::filled(1, 1, 0.95).unwrap();
        let code = encoder.tempencoding(&far).unwrap();
        assert!(!within_budget(&plane, &code, 0.032).unwrap());
    }

    #[test]
    fn projection_saturates_at_upper_edge() {
        let plane = Tensor::filled(1, 1, 0.5).unwrap();
        let band = reachable_band(&plane, 10, 0.15).unwrap();
        let weights = Tensor::filled(1, 10, 0.5).unwrap();
        let code = band.project(&weights).unwrap();
        assert_eq!(
            code.profile(0, 0).unwrap(),
            vec![0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
        );
        assert!(within_budget(&plane, &code, 0.15).unwrap());
    }
}
