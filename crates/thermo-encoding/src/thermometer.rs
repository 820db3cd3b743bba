// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Cumulative thermometer code and its decoder.

use crate::code::LevelCode;
use crate::error::EncodingResult;
use thermo_tensor::Tensor;

/// Cumulative sum of a level code along the level axis.
///
/// On a one-hot input at bucket `b` the result is `0` for levels `< b` and
/// `1` for levels `≥ b`. The same prefix sum is applied to relaxed
/// (probability-valued) codes during the adversarial search.
pub fn thermometer(code: &LevelCode) -> EncodingResult<LevelCode> {
    let levels = code.levels();
    let plane_len = code.plane_len();
    let mut tensor = code.tensor().clone();
    let cols = tensor.shape().1;
    for row in tensor.data_mut().chunks_mut(cols) {
        for level in 1..levels {
            let (before, current) = row.split_at_mut(level * plane_len);
            let previous = &before[(level - 1) * plane_len..];
            for (value, prev) in current[..plane_len].iter_mut().zip(previous) {
                *value += *prev;
            }
        }
    }
    LevelCode::new(tensor, levels, plane_len)
}

/// Decodes a thermometer code back to intensities in the `(N, H·W)` layout.
///
/// A pixel with `S` active levels decodes to `(k + 1 − S) / k`. For a clean
/// code of bucket `b` that is `(b + 1) / k`, the upper edge of the bucket.
pub fn decode(code: &LevelCode) -> EncodingResult<Tensor> {
    let levels = code.levels();
    let plane_len = code.plane_len();
    let k = levels as f32;
    let batch = code.batch();
    let row_len = code.tensor().shape().1;
    let source = code.tensor().data();
    let mut data = Vec::with_capacity(batch * plane_len);
    for row in source.chunks(row_len) {
        for pixel in 0..plane_len {
            let active: f32 = (0..levels).map(|level| row[level * plane_len + pixel]).sum();
            data.push((k + 1.0 - active) / k);
        }
    }
    Ok(Tensor::from_vec(batch, plane_len, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::BucketTensor;
    use crate::one_hot::one_hot;

    #[test]
    fn thermometer_is_prefix_of_one_hot() {
        let buckets = BucketTensor::new(1, 2, vec![2, 0]).unwrap();
        let code = thermometer(&one_hot(&buckets, 4).unwrap()).unwrap();
        assert_eq!(code.profile(0, 0).unwrap(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(code.profile(0, 1).unwrap(), vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn decode_returns_bucket_upper_edge() {
        let buckets = BucketTensor::new(1, 3, vec![0, 3, 9]).unwrap();
        let code = thermometer(&one_hot(&buckets, 10).unwrap()).unwrap();
        let plane = decode(&code).unwrap();
        let expected = [0.1, 0.4, 1.0];
        for (got, want) in plane.data().iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn relaxed_codes_accumulate() {
        let tensor = Tensor::from_vec(1, 3, vec![0.25, 0.5, 0.25]).unwrap();
        let relaxed = LevelCode::new(tensor, 3, 1).unwrap();
        let code = thermometer(&relaxed).unwrap();
        assert_eq!(code.profile(0, 0).unwrap(), vec![0.25, 0.75, 1.0]);
    }
}
