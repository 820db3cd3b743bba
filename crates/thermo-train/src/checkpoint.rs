// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Single-file model checkpoint.
//!
//! The record is written with `bincode` to `<checkpoint_dir>/ckpt.bin`. The
//! directory is created on the first write; every write replaces the
//! previous record.

use crate::error::{TrainError, TrainResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thermo_nn::{Module, StateSnapshot};
use tracing::info;

pub const CHECKPOINT_FILE: &str = "ckpt.bin";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: StateSnapshot,
    /// Evaluation accuracy in percent.
    pub accuracy: f32,
    pub epoch: usize,
    /// Quantization level the weights were trained with.
    pub levels: usize,
}

impl Checkpoint {
    pub fn capture<M: Module + ?Sized>(
        model: &M,
        accuracy: f32,
        epoch: usize,
        levels: usize,
    ) -> TrainResult<Self> {
        Ok(Self {
            state: StateSnapshot::capture(model)?,
            accuracy,
            epoch,
            levels,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> TrainResult<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| TrainError::io(dir, source))?;
        }
        let file = File::create(path).map_err(|source| TrainError::io(path, source))?;
        bincode::serialize_into(BufWriter::new(file), self).map_err(|source| {
            TrainError::Checkpoint {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn load(path: impl AsRef<Path>) -> TrainResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TrainError::io(path, source))?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|source| TrainError::Checkpoint {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the weights into `model`, which must have the same parameters.
    pub fn restore<M: Module + ?Sized>(self, model: &mut M) -> TrainResult<()> {
        self.state.restore(model)?;
        Ok(())
    }
}

/// When an evaluation pass writes the checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// Only when the accuracy beats every earlier pass.
    BestOnly,
    /// After every pass, regardless of accuracy.
    EveryPass,
}

/// Owns the checkpoint path and the best accuracy seen so far.
#[derive(Clone, Debug)]
pub struct CheckpointKeeper {
    path: PathBuf,
    best_accuracy: f32,
}

impl CheckpointKeeper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best_accuracy: 0.0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn best_accuracy(&self) -> f32 {
        self.best_accuracy
    }

    pub(crate) fn set_best_accuracy(&mut self, accuracy: f32) {
        self.best_accuracy = accuracy;
    }

    /// Applies `policy` to the result of an evaluation pass. Returns whether
    /// a checkpoint was written.
    pub fn consider<M: Module + ?Sized>(
        &mut self,
        model: &M,
        policy: CheckpointPolicy,
        accuracy: f32,
        epoch: usize,
        levels: usize,
    ) -> TrainResult<bool> {
        let improved = accuracy > self.best_accuracy;
        let write = match policy {
            CheckpointPolicy::BestOnly => improved,
            CheckpointPolicy::EveryPass => true,
        };
        if write {
            info!(epoch, accuracy, path = %self.path.display(), "saving checkpoint");
            Checkpoint::capture(model, accuracy, epoch, levels)?.save(&self.path)?;
        }
        if improved {
            self.best_accuracy = accuracy;
        }
        Ok(write)
    }
}
