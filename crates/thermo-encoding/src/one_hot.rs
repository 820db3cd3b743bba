// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::code::{BucketTensor, LevelCode};
use crate::error::{EncodingError, EncodingResult};
use crate::quantize::check_levels;
use thermo_tensor::Tensor;

/// Expands buckets into a one-hot level code: exactly one `1` per pixel,
/// at level `bucket`. A bucket outside `[0, levels)` is a boundary
/// overflow and fails the whole call.
pub fn one_hot(buckets: &BucketTensor, levels: usize) -> EncodingResult<LevelCode> {
    check_levels(levels)?;
    if let Some(&bucket) = buckets.as_slice().iter().find(|&&b| b >= levels) {
        return Err(EncodingError::BucketOverflow { bucket, levels });
    }
    let plane_len = buckets.plane_len();
    let cols = levels * plane_len;
    let mut data = vec![0.0f32; buckets.batch() * cols];
    for (flat, &bucket) in buckets.as_slice().iter().enumerate() {
        let image = flat / plane_len;
        let pixel = flat % plane_len;
        data[image * cols + bucket * plane_len + pixel] = 1.0;
    }
    let tensor = Tensor::from_vec(buckets.batch(), cols, data)?;
    LevelCode::new(tensor, levels, plane_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pixel_gets_one_hot_level() {
        let buckets = BucketTensor::new(1, 3, vec![0, 2, 1]).unwrap();
        let code = one_hot(&buckets, 3).unwrap();
        assert_eq!(code.profile(0, 0).unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(code.profile(0, 1).unwrap(), vec![0.0, 0.0, 1.0]);
        assert_eq!(code.profile(0, 2).unwrap(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn bucket_equal_to_levels_overflows() {
        let buckets = BucketTensor::new(1, 2, vec![1, 4]).unwrap();
        assert!(matches!(
            one_hot(&buckets, 4),
            Err(EncodingError::BucketOverflow { bucket: 4, levels: 4 })
        ));
    }
}
