// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Intensity → bucket quantisation.
//!
//! Bucket `b` for intensity `v` counts how many interior thresholds
//! `i / k` (for `i = 1..k`) the value strictly exceeds, so `b ∈ [0, k)`.
//! Values at or above `1` saturate at `k − 1` and values at or below `0`
//! land in bucket `0`; non-finite values are rejected.

use crate::code::BucketTensor;
use crate::error::{EncodingError, EncodingResult};
use rayon::prelude::*;
use thermo_tensor::Tensor;

/// Rejects a zero level count.
pub fn check_levels(levels: usize) -> EncodingResult<()> {
    if levels == 0 {
        return Err(EncodingError::InvalidLevels { levels });
    }
    Ok(())
}

/// Bucket index for a single finite intensity.
#[inline]
pub fn bucket_of(value: f32, levels: usize) -> usize {
    let k = levels as f32;
    (1..levels).filter(|&i| value > i as f32 / k).count()
}

/// Quantises an `(N, H·W)` channel plane into integer buckets.
pub fn quantize(plane: &Tensor, levels: usize) -> EncodingResult<BucketTensor> {
    check_levels(levels)?;
    if let Some((index, &value)) = plane
        .data()
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(EncodingError::NonFiniteIntensity { index, value });
    }
    let buckets: Vec<usize> = plane
        .data()
        .par_iter()
        .map(|&value| bucket_of(value, levels))
        .collect();
    let (rows, cols) = plane.shape();
    BucketTensor::new(rows, cols, buckets)
}
