// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::config::ConfigError;
use std::path::PathBuf;
use thermo_encoding::EncodingError;
use thermo_tensor::TensorError;

pub type TrainResult<T> = Result<T, TrainError>;

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed checkpoint {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("checkpoint was trained with {found} levels but the run uses {expected}")]
    LevelMismatch { expected: usize, found: usize },
    #[error("malformed dataset {path:?}: {reason}")]
    Dataset { path: PathBuf, reason: String },
    #[error("invalid samples: {0}")]
    Samples(String),
    #[error("images are {found_height}x{found_width} but the model expects {height}x{width}")]
    ImageShape {
        height: usize,
        width: usize,
        found_height: usize,
        found_width: usize,
    },
    #[error("cannot render a {width}x{height} grid to {path:?}: pixel buffer has the wrong length")]
    Render {
        path: PathBuf,
        width: usize,
        height: usize,
    },
    #[error("failed to write image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to serialise scalars: {0}")]
    Scalars(#[from] serde_json::Error),
}

impl TrainError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
