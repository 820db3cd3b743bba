// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Lightweight `nn.Module` style surface: explicit forward/backward layers,
//! softmax cross-entropy, SGD with momentum, a step learning-rate schedule and
//! state-dict persistence.

pub mod io;
pub mod layers;
pub mod loss;
pub mod module;
pub mod optim;
pub mod schedule;

pub use io::StateSnapshot;
pub use layers::linear::Linear;
pub use layers::sequential::Sequential;
pub use layers::Relu;
pub use loss::{one_hot_targets, Loss, SoftmaxCrossEntropy};
pub use module::{Module, Parameter};
pub use optim::Sgd;
pub use schedule::StepLr;

pub use thermo_tensor::{PureResult, Tensor, TensorError};
