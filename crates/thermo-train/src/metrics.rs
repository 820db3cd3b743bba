// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::{Deserialize, Serialize};

/// Running loss and accuracy over the batches of one epoch phase.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningStats {
    loss_sum: f32,
    batches: usize,
    correct: usize,
    total: usize,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, loss: f32, predictions: &[usize], labels: &[usize]) {
        self.loss_sum += loss;
        self.batches += 1;
        self.total += labels.len();
        self.correct += predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();
    }

    pub fn mean_loss(&self) -> f32 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss_sum / self.batches as f32
        }
    }

    /// Percentage of correct predictions, `0` before any sample.
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.correct as f32 / self.total as f32
        }
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn batches(&self) -> usize {
        self.batches
    }
}

/// Which loop produced a summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Train,
    Test,
    AdvTrain,
    AdvTest,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Test => "test",
            Phase::AdvTrain => "advtrain",
            Phase::AdvTest => "advtest",
        }
    }
}

/// End-of-phase record, also the line format of `scalars.jsonl`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub phase: Phase,
    pub loss: f32,
    pub accuracy: f32,
    pub correct: usize,
    pub total: usize,
}

impl EpochSummary {
    pub fn from_stats(epoch: usize, phase: Phase, stats: &RunningStats) -> Self {
        Self {
            epoch,
            phase,
            loss: stats.mean_loss(),
            accuracy: stats.accuracy(),
            correct: stats.correct(),
            total: stats.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_loss_and_accuracy() {
        let mut stats = RunningStats::new();
        assert_eq!(stats.accuracy(), 0.0);
        stats.record(2.0, &[1, 2, 3, 4], &[1, 2, 0, 0]);
        stats.record(1.0, &[5], &[5]);
        assert_eq!(stats.mean_loss(), 1.5);
        assert_eq!(stats.correct(), 3);
        assert_eq!(stats.total(), 5);
        assert!((stats.accuracy() - 60.0).abs() < 1e-5);
    }
}
