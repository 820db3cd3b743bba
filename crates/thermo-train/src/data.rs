// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Labelled image datasets and batching.
//!
//! The CIFAR-10 binary format stores one record per image: a label byte
//! followed by 3072 bytes holding the red, green and blue 32×32 planes in
//! that order, which is exactly the channel-planar row layout of
//! [`ImageBatch`].

use crate::error::{TrainError, TrainResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::Path;
use thermo_config::determinism;
use thermo_encoding::ImageBatch;
use thermo_tensor::Tensor;
use tracing::info;

pub const CIFAR_SIDE: usize = 32;
pub const CIFAR_CHANNELS: usize = 3;
const CIFAR_RECORD: usize = 1 + CIFAR_CHANNELS * CIFAR_SIDE * CIFAR_SIDE;
const CIFAR_TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const CIFAR_TEST_FILE: &str = "test_batch.bin";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// In-memory labelled images, `(N, 3·H·W)` in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct Dataset {
    pixels: Vec<f32>,
    labels: Vec<usize>,
    channels: usize,
    height: usize,
    width: usize,
}

impl Dataset {
    pub fn new(
        pixels: Vec<f32>,
        labels: Vec<usize>,
        channels: usize,
        height: usize,
        width: usize,
    ) -> TrainResult<Self> {
        let image_len = channels * height * width;
        if image_len == 0 || labels.is_empty() || pixels.len() != labels.len() * image_len {
            return Err(TrainError::Samples(format!(
                "{} pixels do not describe {} images of {}x{}x{}",
                pixels.len(),
                labels.len(),
                channels,
                height,
                width
            )));
        }
        Ok(Self {
            pixels,
            labels,
            channels,
            height,
            width,
        })
    }

    /// Reads the CIFAR-10 binary batches of `split` from `dir`.
    pub fn cifar10(dir: impl AsRef<Path>, split: Split) -> TrainResult<Self> {
        let dir = dir.as_ref();
        let files: Vec<&str> = match split {
            Split::Train => CIFAR_TRAIN_FILES.to_vec(),
            Split::Test => vec![CIFAR_TEST_FILE],
        };
        let mut pixels = Vec::new();
        let mut labels = Vec::new();
        for name in files {
            let path = dir.join(name);
            let bytes = fs::read(&path).map_err(|source| TrainError::io(&path, source))?;
            parse_cifar_records(&path, &bytes, &mut pixels, &mut labels)?;
        }
        info!(split = ?split, images = labels.len(), dir = %dir.display(), "loaded cifar-10");
        Self::new(pixels, labels, CIFAR_CHANNELS, CIFAR_SIDE, CIFAR_SIDE)
    }

    /// Random images whose brightness encodes the label, so a classifier
    /// can actually learn them.
    pub fn synthetic(count: usize, height: usize, width: usize, seed: Option<u64>) -> TrainResult<Self> {
        let mut rng = determinism::rng_from_optional(seed, "thermo-train/data/synthetic");
        let image_len = CIFAR_CHANNELS * height * width;
        let mut pixels = Vec::with_capacity(count * image_len);
        let mut labels = Vec::with_capacity(count);
        for _ in 0..count {
            let label = rng.gen_range(0..crate::model::NUM_CLASSES);
            let base = (label as f32 + 0.5) / crate::model::NUM_CLASSES as f32;
            for _ in 0..image_len {
                let noise: f32 = rng.gen_range(-0.04..0.04);
                pixels.push((base + noise).clamp(0.0, 1.0));
            }
            labels.push(label);
        }
        Self::new(pixels, labels, CIFAR_CHANNELS, height, width)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn image_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Splits the sample indices into batches, shuffled when `rng` is given.
    pub fn batch_indices(&self, batch_size: usize, rng: Option<&mut StdRng>) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        order
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Gathers the listed samples into an image batch and label vector.
    pub fn batch(&self, indices: &[usize]) -> TrainResult<(ImageBatch, Vec<usize>)> {
        let image_len = self.image_len();
        let mut data = Vec::with_capacity(indices.len() * image_len);
        let mut labels = Vec::with_capacity(indices.len());
        for &index in indices {
            let Some(&label) = self.labels.get(index) else {
                return Err(TrainError::Samples(format!(
                    "sample {index} out of range for {} images",
                    self.len()
                )));
            };
            data.extend_from_slice(&self.pixels[index * image_len..(index + 1) * image_len]);
            labels.push(label);
        }
        let pixels = Tensor::from_vec(indices.len(), image_len, data)?;
        let images = ImageBatch::new(pixels, self.channels, self.height, self.width)?;
        Ok((images, labels))
    }
}

fn parse_cifar_records(
    path: &Path,
    bytes: &[u8],
    pixels: &mut Vec<f32>,
    labels: &mut Vec<usize>,
) -> TrainResult<()> {
    if bytes.is_empty() || bytes.len() % CIFAR_RECORD != 0 {
        return Err(TrainError::Dataset {
            path: path.to_path_buf(),
            reason: format!(
                "size {} is not a multiple of the {CIFAR_RECORD}-byte record",
                bytes.len()
            ),
        });
    }
    for record in bytes.chunks_exact(CIFAR_RECORD) {
        let label = record[0] as usize;
        if label >= crate::model::NUM_CLASSES {
            return Err(TrainError::Dataset {
                path: path.to_path_buf(),
                reason: format!("label {label} out of range"),
            });
        }
        labels.push(label);
        pixels.extend(record[1..].iter().map(|&b| b as f32 / 255.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(bytes: &mut Vec<u8>, label: u8, value: u8) {
        bytes.push(label);
        bytes.extend(std::iter::repeat(value).take(CIFAR_RECORD - 1));
    }

    #[test]
    fn reads_cifar_test_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        write_record(&mut bytes, 3, 255);
        write_record(&mut bytes, 7, 0);
        fs::write(dir.path().join(CIFAR_TEST_FILE), &bytes).unwrap();
        let data = Dataset::cifar10(dir.path(), Split::Test).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.labels(), &[3, 7]);
        let (images, labels) = data.batch(&[1, 0]).unwrap();
        assert_eq!(labels, vec![7, 3]);
        assert_eq!(images.pixel(1, 2, 31, 31).unwrap(), 1.0);
        assert_eq!(images.pixel(0, 0, 0, 0).unwrap(), 0.0);
    }

    #[test]
    fn in_memory_errors_do_not_name_a_file() {
        let err = Dataset::new(vec![0.0; 5], vec![1, 2], 1, 2, 2).unwrap_err();
        assert!(matches!(err, TrainError::Samples(_)));
        assert!(!err.to_string().contains("\"\""));
        let data = Dataset::synthetic(3, 2, 2, Some(1)).unwrap();
        assert!(matches!(data.batch(&[0, 3]), Err(TrainError::Samples(_))));
    }

    #[test]
    fn truncated_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CIFAR_TEST_FILE), vec![0u8; 100]).unwrap();
        assert!(matches!(
            Dataset::cifar10(dir.path(), Split::Test),
            Err(TrainError::Dataset { .. })
        ));
        assert!(matches!(
            Dataset::cifar10(dir.path(), Split::Train),
            Err(TrainError::Io { .. })
        ));
    }

    #[test]
    fn shuffled_batches_cover_every_sample() {
        let data = Dataset::synthetic(10, 2, 2, Some(1)).unwrap();
        let mut rng = determinism::rng_from_optional(Some(2), "test");
        let batches = data.batch_indices(4, Some(&mut rng));
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        let mut all: Vec<usize> = batches.concat();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(data.batch_indices(4, None)[0], vec![0, 1, 2, 3]);
    }
}
