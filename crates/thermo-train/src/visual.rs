// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Observational output: image grids and per-epoch scalars.

use crate::error::{TrainError, TrainResult};
use crate::metrics::EpochSummary;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thermo_encoding::{EncodingResult, ImageBatch};

/// Tiles a batch into one image, `nrow` images per row with `padding`
/// black pixels around every tile.
pub fn make_grid(images: &ImageBatch, nrow: usize, padding: usize) -> EncodingResult<ImageBatch> {
    let count = images.batch();
    let columns = nrow.max(1).min(count);
    let rows = count.div_ceil(columns);
    let (channels, height, width) = (images.channels(), images.height(), images.width());
    let cell_h = height + padding;
    let cell_w = width + padding;
    let grid_h = rows * cell_h + padding;
    let grid_w = columns * cell_w + padding;
    let mut data = vec![0.0f32; channels * grid_h * grid_w];
    let image_len = channels * height * width;
    for (index, src) in images.pixels().data().chunks(image_len).enumerate() {
        let top = (index / columns) * cell_h + padding;
        let left = (index % columns) * cell_w + padding;
        for c in 0..channels {
            for y in 0..height {
                let from = c * height * width + y * width;
                let to = c * grid_h * grid_w + (top + y) * grid_w + left;
                data[to..to + width].copy_from_slice(&src[from..from + width]);
            }
        }
    }
    ImageBatch::from_vec(1, channels, grid_h, grid_w, data)
}

/// Receives images and scalars produced during training. Nothing written
/// here feeds back into the run.
pub trait VisualizationSink {
    fn add_image(&mut self, tag: &str, image: &ImageBatch, epoch: usize) -> TrainResult<()>;

    fn add_scalars(&mut self, summary: &EpochSummary) -> TrainResult<()>;
}

/// Writes `<tag>_<epoch>.png` files and a `scalars.jsonl` log into a directory.
#[derive(Clone, Debug)]
pub struct PngSink {
    dir: PathBuf,
}

impl PngSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> TrainResult<()> {
        fs::create_dir_all(&self.dir).map_err(|source| TrainError::io(&self.dir, source))
    }
}

impl VisualizationSink for PngSink {
    fn add_image(&mut self, tag: &str, image: &ImageBatch, epoch: usize) -> TrainResult<()> {
        self.ensure_dir()?;
        let path = self.dir.join(format!("{tag}_{epoch:04}.png"));
        let (height, width) = (image.height(), image.width());
        let mut buffer = Vec::with_capacity(height * width * 3);
        for y in 0..height {
            for x in 0..width {
                for c in 0..3 {
                    // grayscale grids repeat their only channel
                    let channel = c.min(image.channels() - 1);
                    let value = image.pixel(0, channel, y, x)?;
                    buffer.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
                }
            }
        }
        let rgb = image::RgbImage::from_raw(width as u32, height as u32, buffer).ok_or_else(|| {
            TrainError::Render {
                path: path.clone(),
                width,
                height,
            }
        })?;
        rgb.save(&path).map_err(|source| TrainError::Image { path, source })
    }

    fn add_scalars(&mut self, summary: &EpochSummary) -> TrainResult<()> {
        self.ensure_dir()?;
        let path = self.dir.join("scalars.jsonl");
        let line = serde_json::to_string(summary)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| TrainError::io(&path, source))?;
        writeln!(file, "{line}").map_err(|source| TrainError::io(&path, source))
    }
}
