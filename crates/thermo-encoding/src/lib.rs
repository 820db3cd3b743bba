// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Thermometer encoding for adversarially robust image classifiers.
//!
//! A pixel intensity `v ∈ [0, 1]` is quantised into one of `k` buckets, the
//! bucket is expanded into a one-hot vector of length `k`, and the one-hot
//! vector is turned into a cumulative code whose entry `i` is on iff the
//! bucket is `≤ i`. Each colour channel is encoded independently.
//!
//! ```text
//! plane (N, H·W) ─quantize→ buckets (N, H·W) ─one_hot→ (N, k·H·W) ─thermometer→ (N, k·H·W)
//! ```
//!
//! The [`attack`] module describes what the training loop expects from an
//! adversary working on the continuous relaxation of that code, and ships the
//! logit-space projected gradient ascent used for adversarial training.

pub mod attack;
pub mod code;
pub mod encoder;
pub mod error;
pub mod image;
pub mod one_hot;
pub mod quantize;
pub mod thermometer;

pub use attack::{
    reachable_band, within_budget, Attacker, BucketBand, GradientOracle, LsPga, LsPgaConfig,
    NoiseAttacker,
};
pub use code::{BucketTensor, LevelCode};
pub use encoder::{EncodingMode, ThermometerEncoder, DEFAULT_LEVELS};
pub use error::{EncodingError, EncodingResult};
pub use image::ImageBatch;

pub use thermo_tensor::{PureResult, Tensor, TensorError};
