// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::code::{BucketTensor, LevelCode};
use crate::error::{EncodingError, EncodingResult};
use crate::image::ImageBatch;
use crate::{one_hot, quantize, thermometer};
use thermo_tensor::Tensor;

/// Level count used by the training program unless configured otherwise.
pub const DEFAULT_LEVELS: usize = 15;

/// Selects which code the facade produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncodingMode {
    #[default]
    Thermometer,
    OneHot,
}

/// Stateless encoding configuration: the level count and nothing else.
///
/// Every method is a pure function of its input and `k`; the encoder can be
/// copied freely and shared between threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThermometerEncoder {
    levels: usize,
}

impl ThermometerEncoder {
    pub fn new(levels: usize) -> EncodingResult<Self> {
        quantize::check_levels(levels)?;
        Ok(Self { levels })
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn quantize(&self, plane: &Tensor) -> EncodingResult<BucketTensor> {
        quantize::quantize(plane, self.levels)
    }

    pub fn expand(&self, buckets: &BucketTensor) -> EncodingResult<LevelCode> {
        one_hot::one_hot(buckets, self.levels)
    }

    pub fn encode(&self, one_hot: &LevelCode) -> EncodingResult<LevelCode> {
        self.check_code(one_hot)?;
        thermometer::thermometer(one_hot)
    }

    /// `encode(expand(quantize(plane)))` for one `(N, H·W)` channel plane.
    pub fn tempencoding(&self, plane: &Tensor) -> EncodingResult<LevelCode> {
        let one_hot = self.onehot_encoding(plane)?;
        thermometer::thermometer(&one_hot)
    }

    /// `expand(quantize(plane))` without the cumulative step.
    pub fn onehot_encoding(&self, plane: &Tensor) -> EncodingResult<LevelCode> {
        let buckets = self.quantize(plane)?;
        self.expand(&buckets)
    }

    /// Decodes a thermometer code to intensities; lossy, meant for display.
    pub fn temp2img(&self, code: &LevelCode) -> EncodingResult<Tensor> {
        self.check_code(code)?;
        thermometer::decode(code)
    }

    pub fn transform(&self, plane: &Tensor, mode: EncodingMode) -> EncodingResult<LevelCode> {
        match mode {
            EncodingMode::Thermometer => self.tempencoding(plane),
            EncodingMode::OneHot => self.onehot_encoding(plane),
        }
    }

    /// Encodes every channel of a batch independently, in channel order.
    pub fn encode_batch(
        &self,
        images: &ImageBatch,
        mode: EncodingMode,
    ) -> EncodingResult<Vec<LevelCode>> {
        images
            .planes()?
            .iter()
            .map(|plane| self.transform(plane, mode))
            .collect()
    }

    /// Decodes per-channel thermometer codes back into an image batch.
    pub fn decode_batch(
        &self,
        codes: &[LevelCode],
        height: usize,
        width: usize,
    ) -> EncodingResult<ImageBatch> {
        let planes = codes
            .iter()
            .map(|code| self.temp2img(code))
            .collect::<EncodingResult<Vec<_>>>()?;
        ImageBatch::from_channels(&planes, height, width)
    }

    fn check_code(&self, code: &LevelCode) -> EncodingResult<()> {
        if code.levels() != self.levels {
            return Err(EncodingError::Layout {
                what: "levels of code",
                expected: self.levels,
                got: code.levels(),
            });
        }
        Ok(())
    }
}

impl Default for ThermometerEncoder {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_levels_is_a_configuration_error() {
        assert!(matches!(
            ThermometerEncoder::new(0),
            Err(EncodingError::InvalidLevels { levels: 0 })
        ));
    }

    #[test]
    fn black_image_is_all_ones() {
        let encoder = ThermometerEncoder::new(15).unwrap();
        let images = ImageBatch::from_vec(1, 3, 2, 2, vec![0.0; 12]).unwrap();
        let codes = encoder.encode_batch(&images, EncodingMode::Thermometer).unwrap();
        assert_eq!(codes.len(), 3);
        for code in &codes {
            assert_eq!(code.tensor().shape(), (1, 15 * 4));
            assert!(code.tensor().data().iter().all(|&v| v == 1.0));
        }
    }

    #[test]
    fn mid_grey_switches_on_at_bucket_seven() {
        let encoder = ThermometerEncoder::new(15).unwrap();
        let plane = Tensor::filled(1, 1, 0.5).unwrap();
        let code = encoder.tempencoding(&plane).unwrap();
        let profile = code.profile(0, 0).unwrap();
        for (level, value) in profile.iter().enumerate() {
            let expected = if level >= 7 { 1.0 } else { 0.0 };
            assert_eq!(*value, expected, "level {level}");
        }
        let one_hot = encoder.onehot_encoding(&plane).unwrap();
        assert_eq!(one_hot.value(0, 7, 0), Some(1.0));
        assert_eq!(one_hot.tensor().data().iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn full_intensity_lands_in_top_bucket() {
        let encoder = ThermometerEncoder::new(15).unwrap();
        let plane = Tensor::filled(1, 1, 1.0).unwrap();
        let code = encoder.onehot_encoding(&plane).unwrap();
        assert_eq!(code.value(0, 14, 0), Some(1.0));
        let decoded = encoder.temp2img(&encoder.tempencoding(&plane).unwrap()).unwrap();
        assert!((decoded.data()[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn codes_of_other_levels_are_rejected() {
        let small = ThermometerEncoder::new(4).unwrap();
        let large = ThermometerEncoder::new(8).unwrap();
        let plane = Tensor::filled(1, 2, 0.3).unwrap();
        let code = small.tempencoding(&plane).unwrap();
        assert!(large.temp2img(&code).is_err());
    }

    #[test]
    fn decode_batch_restores_layout() {
        let encoder = ThermometerEncoder::new(10).unwrap();
        let data: Vec<f32> = (0..12).map(|v| v as f32 / 12.0).collect();
        let images = ImageBatch::from_vec(1, 3, 2, 2, data).unwrap();
        let codes = encoder.encode_batch(&images, EncodingMode::Thermometer).unwrap();
        let decoded = encoder.decode_batch(&codes, 2, 2).unwrap();
        assert_eq!(decoded.channels(), 3);
        for (got, want) in decoded.pixels().data().iter().zip(images.pixels().data()) {
            assert!((got - want).abs() <= 0.1 + 1e-6);
        }
    }
}
