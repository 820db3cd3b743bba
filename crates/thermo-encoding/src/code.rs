// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Containers for the intermediate and final representations of one channel.

use crate::error::{EncodingError, EncodingResult};
use thermo_tensor::Tensor;

/// Integer bucket per pixel, `(N, H·W)` row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketTensor {
    buckets: Vec<usize>,
    batch: usize,
    plane_len: usize,
}

impl BucketTensor {
    /// Wraps raw buckets. Values are not range-checked here; the one-hot
    /// expander is the component that rejects buckets outside `[0, k)`.
    pub fn new(batch: usize, plane_len: usize, buckets: Vec<usize>) -> EncodingResult<Self> {
        if batch == 0 || plane_len == 0 || buckets.len() != batch * plane_len {
            return Err(EncodingError::Layout {
                what: "bucket tensor",
                expected: batch * plane_len,
                got: buckets.len(),
            });
        }
        Ok(Self {
            buckets,
            batch,
            plane_len,
        })
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn plane_len(&self) -> usize {
        self.plane_len
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.buckets
    }

    /// Bucket of pixel `pixel` in image `image`.
    pub fn get(&self, image: usize, pixel: usize) -> Option<usize> {
        if pixel >= self.plane_len {
            return None;
        }
        self.buckets.get(image * self.plane_len + pixel).copied()
    }
}

/// A `(N, k, H, W)` level code flattened to a `(N, k·H·W)` tensor whose
/// entry `(n, i, p)` sits at column `i·H·W + p`. Holds one-hot codes,
/// thermometer codes and their continuous relaxations alike.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelCode {
    tensor: Tensor,
    levels: usize,
    plane_len: usize,
}

impl LevelCode {
    pub fn new(tensor: Tensor, levels: usize, plane_len: usize) -> EncodingResult<Self> {
        if levels == 0 {
            return Err(EncodingError::InvalidLevels { levels });
        }
        let expected = levels * plane_len;
        if plane_len == 0 || tensor.shape().1 != expected {
            return Err(EncodingError::Layout {
                what: "level code",
                expected,
                got: tensor.shape().1,
            });
        }
        Ok(Self {
            tensor,
            levels,
            plane_len,
        })
    }

    pub fn batch(&self) -> usize {
        self.tensor.shape().0
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn plane_len(&self) -> usize {
        self.plane_len
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn into_tensor(self) -> Tensor {
        self.tensor
    }

    /// Column of level `level` for pixel `pixel`.
    #[inline]
    pub fn column(&self, level: usize, pixel: usize) -> usize {
        level * self.plane_len + pixel
    }

    /// Value at `(image, level, pixel)`.
    pub fn value(&self, image: usize, level: usize, pixel: usize) -> Option<f32> {
        if level >= self.levels || pixel >= self.plane_len {
            return None;
        }
        let row = self.tensor.row(image).ok()?;
        row.get(self.column(level, pixel)).copied()
    }

    /// The `k` values of one pixel, ordered along the level axis.
    pub fn profile(&self, image: usize, pixel: usize) -> EncodingResult<Vec<f32>> {
        let row = self.tensor.row(image)?;
        if pixel >= self.plane_len {
            return Err(EncodingError::Layout {
                what: "pixel index",
                expected: self.plane_len,
                got: pixel,
            });
        }
        Ok((0..self.levels)
            .map(|level| row[self.column(level, pixel)])
            .collect())
    }

    /// Keeps only the listed images, in order.
    pub fn select(&self, indices: &[usize]) -> EncodingResult<Self> {
        Self::new(
            self.tensor.select_rows(indices)?,
            self.levels,
            self.plane_len,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_code_indexes_level_major() {
        // two levels, three pixels
        let tensor = Tensor::from_vec(1, 6, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]).unwrap();
        let code = LevelCode::new(tensor, 2, 3).unwrap();
        assert_eq!(code.value(0, 1, 2), Some(12.0));
        assert_eq!(code.profile(0, 1).unwrap(), vec![1.0, 11.0]);
        assert_eq!(code.value(0, 2, 0), None);
    }

    #[test]
    fn shapes_are_checked() {
        let tensor = Tensor::zeros(1, 5).unwrap();
        assert!(LevelCode::new(tensor.clone(), 2, 3).is_err());
        assert!(LevelCode::new(tensor, 0, 5).is_err());
        assert!(BucketTensor::new(2, 2, vec![0; 3]).is_err());
    }
}
