// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rand::rngs::StdRng;
use rand::Rng;
use thermo_encoding::{EncodingResult, ImageBatch};

/// Training-time augmentation: random crop of the original size after zero
/// padding, then a random horizontal flip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Augmenter {
    pub padding: usize,
    pub flip_probability: f64,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self {
            padding: 4,
            flip_probability: 0.5,
        }
    }
}

impl Augmenter {
    pub fn apply(&self, images: &ImageBatch, rng: &mut StdRng) -> EncodingResult<ImageBatch> {
        let (channels, height, width) = (images.channels(), images.height(), images.width());
        let image_len = channels * height * width;
        let pad = self.padding as isize;
        let mut out = vec![0.0f32; images.batch() * image_len];
        for (src, dst) in images
            .pixels()
            .data()
            .chunks(image_len)
            .zip(out.chunks_mut(image_len))
        {
            let dy = rng.gen_range(0..=2 * self.padding) as isize - pad;
            let dx = rng.gen_range(0..=2 * self.padding) as isize - pad;
            let flip = rng.gen_bool(self.flip_probability);
            for y in 0..height {
                let sy = y as isize + dy;
                if sy < 0 || sy >= height as isize {
                    continue;
                }
                for x in 0..width {
                    let cx = if flip { width - 1 - x } else { x };
                    let sx = cx as isize + dx;
                    if sx < 0 || sx >= width as isize {
                        continue;
                    }
                    for c in 0..channels {
                        let plane = c * height * width;
                        dst[plane + y * width + x] =
                            src[plane + sy as usize * width + sx as usize];
                    }
                }
            }
        }
        ImageBatch::from_vec(images.batch(), channels, height, width, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermo_config::determinism;

    #[test]
    fn no_padding_and_forced_flip_mirrors_rows() {
        let images = ImageBatch::from_vec(1, 3, 1, 3, (0..9).map(|v| v as f32).collect()).unwrap();
        let augmenter = Augmenter {
            padding: 0,
            flip_probability: 1.0,
        };
        let mut rng = determinism::rng_from_optional(Some(0), "augment");
        let out = augmenter.apply(&images, &mut rng).unwrap();
        assert_eq!(
            out.pixels().data(),
            &[2.0, 1.0, 0.0, 5.0, 4.0, 3.0, 8.0, 7.0, 6.0]
        );
    }

    #[test]
    fn padded_crop_keeps_shape_and_values() {
        let images = ImageBatch::from_vec(4, 3, 10, 10, vec![1.0; 4 * 3 * 100]).unwrap();
        let mut rng = determinism::rng_from_optional(Some(7), "augment");
        let out = Augmenter::default().apply(&images, &mut rng).unwrap();
        assert_eq!(out.pixels().shape(), images.pixels().shape());
        assert!(out.pixels().data().iter().all(|&v| v == 0.0 || v == 1.0));
        // every crop offset keeps at least the central pixel
        for n in 0..4 {
            assert_eq!(out.pixel(n, 0, 4, 4).unwrap(), 1.0);
        }
    }
}
