// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{EncodingError, EncodingResult};
use thermo_tensor::Tensor;

/// Batch of `N` images stored as a `(N, C·H·W)` tensor with channel-planar
/// rows: every pixel of channel 0, then channel 1, and so on.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBatch {
    pixels: Tensor,
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageBatch {
    /// Wraps an existing pixel tensor after checking its column count.
    pub fn new(pixels: Tensor, channels: usize, height: usize, width: usize) -> EncodingResult<Self> {
        let expected = channels * height * width;
        if expected == 0 || pixels.shape().1 != expected {
            return Err(EncodingError::Layout {
                what: "image batch",
                expected,
                got: pixels.shape().1,
            });
        }
        Ok(Self {
            pixels,
            channels,
            height,
            width,
        })
    }

    /// Builds a batch from a flat `N·C·H·W` buffer.
    pub fn from_vec(
        batch: usize,
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<f32>,
    ) -> EncodingResult<Self> {
        let pixels = Tensor::from_vec(batch, channels * height * width, data)?;
        Self::new(pixels, channels, height, width)
    }

    /// Re-assembles a batch from per-channel `(N, H·W)` planes.
    pub fn from_channels(planes: &[Tensor], height: usize, width: usize) -> EncodingResult<Self> {
        let plane_len = height * width;
        for plane in planes {
            if plane.shape().1 != plane_len {
                return Err(EncodingError::Layout {
                    what: "channel plane",
                    expected: plane_len,
                    got: plane.shape().1,
                });
            }
        }
        let pixels = Tensor::cat_cols(planes)?;
        Self::new(pixels, planes.len(), height, width)
    }

    pub fn batch(&self) -> usize {
        self.pixels.shape().0
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Pixels per channel plane (`H·W`).
    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    pub fn pixels(&self) -> &Tensor {
        &self.pixels
    }

    pub fn into_pixels(self) -> Tensor {
        self.pixels
    }

    /// Extracts channel `index` as an `(N, H·W)` plane.
    pub fn channel(&self, index: usize) -> EncodingResult<Tensor> {
        if index >= self.channels {
            return Err(EncodingError::ChannelMismatch {
                expected: self.channels,
                got: index + 1,
            });
        }
        let widths = vec![self.plane_len(); self.channels];
        let mut planes = self.pixels.split_cols(&widths)?;
        Ok(planes.swap_remove(index))
    }

    /// Splits the batch into all of its channel planes.
    pub fn planes(&self) -> EncodingResult<Vec<Tensor>> {
        let widths = vec![self.plane_len(); self.channels];
        Ok(self.pixels.split_cols(&widths)?)
    }

    /// Keeps only the listed images, in order.
    pub fn select(&self, indices: &[usize]) -> EncodingResult<Self> {
        let pixels = self.pixels.select_rows(indices)?;
        Self::new(pixels, self.channels, self.height, self.width)
    }

    /// Reads the intensity of one pixel.
    pub fn pixel(&self, image: usize, channel: usize, y: usize, x: usize) -> EncodingResult<f32> {
        let row = self.pixels.row(image)?;
        let idx = channel * self.plane_len() + y * self.width + x;
        row.get(idx).copied().ok_or(EncodingError::Layout {
            what: "pixel coordinate",
            expected: row.len(),
            got: idx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_split_and_rejoin() {
        let data: Vec<f32> = (0..2 * 3 * 4).map(|v| v as f32 / 24.0).collect();
        let batch = ImageBatch::from_vec(2, 3, 2, 2, data).unwrap();
        let green = batch.channel(1).unwrap();
        assert_eq!(green.shape(), (2, 4));
        assert_eq!(green.data()[0], 4.0 / 24.0);
        let rebuilt = ImageBatch::from_channels(&batch.planes().unwrap(), 2, 2).unwrap();
        assert_eq!(rebuilt, batch);
        assert_eq!(batch.pixel(1, 2, 1, 1).unwrap(), 23.0 / 24.0);
    }

    #[test]
    fn layout_is_validated() {
        let pixels = Tensor::zeros(1, 10).unwrap();
        assert!(matches!(
            ImageBatch::new(pixels, 3, 2, 2),
            Err(EncodingError::Layout { expected: 12, .. })
        ));
        let batch = ImageBatch::from_vec(1, 3, 1, 1, vec![0.0; 3]).unwrap();
        assert!(batch.channel(3).is_err());
    }
}
