// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thermo_tensor::TensorError;

pub type EncodingResult<T> = Result<T, EncodingError>;

/// Failures raised while encoding images or running an attack.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("quantization level must be positive, got {levels}")]
    InvalidLevels { levels: usize },
    #[error("quantization boundary overflow: bucket {bucket} does not fit {levels} levels")]
    BucketOverflow { bucket: usize, levels: usize },
    #[error("non-finite intensity {value} at flat index {index}")]
    NonFiniteIntensity { index: usize, value: f32 },
    #[error("expected {expected} columns for {what}, got {got}")]
    Layout {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("expected {expected} channels, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
    #[error("{labels} labels supplied for a batch of {batch} images")]
    LabelMismatch { labels: usize, batch: usize },
    #[error("invalid attack parameter {name}: {value}")]
    InvalidAttackParameter { name: &'static str, value: f32 },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
