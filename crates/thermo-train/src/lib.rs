// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! CIFAR-10 training with thermometer-encoded inputs, clean or against the
//! logit-space adversary.

pub mod augment;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod session;
pub mod visual;

pub use augment::Augmenter;
pub use checkpoint::{Checkpoint, CheckpointKeeper, CheckpointPolicy, CHECKPOINT_FILE};
pub use config::{AttackSettings, ConfigError, DataSource, RunConfig};
pub use data::{Dataset, Split};
pub use error::{TrainError, TrainResult};
pub use metrics::{EpochSummary, Phase, RunningStats};
pub use model::{ClassifierOracle, ThermoNet, NUM_CLASSES};
pub use session::{RunSummary, TrainingSession};
pub use visual::{make_grid, PngSink, VisualizationSink};
