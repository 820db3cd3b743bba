// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The training loop.
//!
//! A [`TrainingSession`] owns everything that changes during a run: the
//! classifier, its optimiser and schedule, the adversary, the checkpoint
//! keeper with the best accuracy so far, and the random state used for
//! shuffling and augmentation. Batches are processed strictly in order.
//!
//! The mode is chosen once per run: with zero attack steps every epoch runs
//! [`TrainingSession::train`] then [`TrainingSession::test`], otherwise
//! [`TrainingSession::advtrain`] then [`TrainingSession::advtest`]. The
//! learning-rate schedule steps after each epoch in both modes.

use crate::augment::Augmenter;
use crate::checkpoint::{Checkpoint, CheckpointKeeper, CheckpointPolicy};
use crate::config::RunConfig;
use crate::data::Dataset;
use crate::error::{TrainError, TrainResult};
use crate::metrics::{EpochSummary, Phase, RunningStats};
use crate::model::{ClassifierOracle, ThermoNet, NUM_CLASSES};
use crate::visual::{make_grid, VisualizationSink};
use rand::rngs::StdRng;
use thermo_config::determinism;
use thermo_encoding::{Attacker, EncodingError, EncodingMode, ImageBatch, LevelCode, LsPga, ThermometerEncoder};
use thermo_nn::{one_hot_targets, Loss, Module, Sgd, SoftmaxCrossEntropy, StepLr};
use tracing::{debug, info, warn};

/// Images per row of the visualisation grid.
const GRID_NROW: usize = 8;
const GRID_PADDING: usize = 2;
/// Adversarial examples shown per epoch.
const GRID_SAMPLES: usize = 3;

/// Outcome of [`TrainingSession::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub first_epoch: usize,
    pub epochs_run: usize,
    pub best_accuracy: f32,
    pub history: Vec<EpochSummary>,
}

pub struct TrainingSession {
    config: RunConfig,
    encoder: ThermometerEncoder,
    model: ThermoNet,
    loss: SoftmaxCrossEntropy,
    optimizer: Sgd,
    scheduler: StepLr,
    attacker: Box<dyn Attacker>,
    keeper: CheckpointKeeper,
    augmenter: Option<Augmenter>,
    sink: Box<dyn VisualizationSink>,
    rng: StdRng,
    height: usize,
    width: usize,
    start_epoch: usize,
}

impl core::fmt::Debug for TrainingSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrainingSession")
            .field("levels", &self.encoder.levels())
            .field("image", &(self.height, self.width))
            .field("start_epoch", &self.start_epoch)
            .field("best_accuracy", &self.keeper.best_accuracy())
            .field("learning_rate", &self.optimizer.learning_rate())
            .finish()
    }
}

impl TrainingSession {
    /// Builds a fresh session for `height × width` RGB images, or resumes
    /// from the checkpoint when `config.resume` is set.
    pub fn new(
        config: RunConfig,
        height: usize,
        width: usize,
        sink: Box<dyn VisualizationSink>,
    ) -> TrainResult<Self> {
        config.validate()?;
        let encoder = ThermometerEncoder::new(config.levels)?;
        let model = ThermoNet::new(
            crate::data::CIFAR_CHANNELS,
            config.levels,
            height * width,
            config.hidden,
            NUM_CLASSES,
            config.seed,
        )?;
        let optimizer = Sgd::new(config.learning_rate)?
            .with_momentum(config.momentum)
            .with_weight_decay(config.weight_decay);
        let scheduler = StepLr::new(&optimizer, config.lr_step, config.lr_gamma)?;
        let attacker = LsPga::new(
            config.levels,
            config.attack.lspga(config.seed.map(|s| s.wrapping_add(1))),
        )?;
        let keeper = CheckpointKeeper::new(config.checkpoint_path());
        let augmenter = config.augment.then(Augmenter::default);
        let rng = determinism::rng_from_optional(config.seed, "thermo-train/session");
        let resume = config.resume;
        let mut session = Self {
            config,
            encoder,
            model,
            loss: SoftmaxCrossEntropy::new(),
            optimizer,
            scheduler,
            attacker: Box::new(attacker),
            keeper,
            augmenter,
            sink,
            rng,
            height,
            width,
            start_epoch: 0,
        };
        if resume {
            session.resume()?;
        }
        Ok(session)
    }

    /// Replaces the adversary, e.g. with a cheaper baseline.
    pub fn with_attacker(mut self, attacker: Box<dyn Attacker>) -> TrainResult<Self> {
        if attacker.levels() != self.encoder.levels() {
            return Err(EncodingError::Layout {
                what: "attacker levels",
                expected: self.encoder.levels(),
                got: attacker.levels(),
            }
            .into());
        }
        self.attacker = attacker;
        Ok(self)
    }

    fn resume(&mut self) -> TrainResult<()> {
        let path = self.keeper.path().to_path_buf();
        info!(path = %path.display(), "resuming from checkpoint");
        let checkpoint = Checkpoint::load(&path)?;
        if checkpoint.levels != self.encoder.levels() {
            return Err(TrainError::LevelMismatch {
                expected: self.encoder.levels(),
                found: checkpoint.levels,
            });
        }
        let (accuracy, epoch) = (checkpoint.accuracy, checkpoint.epoch);
        checkpoint.restore(&mut self.model)?;
        self.keeper.set_best_accuracy(accuracy);
        self.start_epoch = epoch + 1;
        self.scheduler
            .fast_forward(&mut self.optimizer, self.start_epoch)?;
        info!(
            epoch,
            accuracy,
            learning_rate = self.optimizer.learning_rate(),
            "restored checkpoint"
        );
        Ok(())
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn model(&self) -> &ThermoNet {
        &self.model
    }

    pub fn encoder(&self) -> &ThermometerEncoder {
        &self.encoder
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn best_accuracy(&self) -> f32 {
        self.keeper.best_accuracy()
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    /// Runs `config.epochs` epochs starting at [`Self::start_epoch`].
    pub fn run(&mut self, train: &Dataset, test: &Dataset) -> TrainResult<RunSummary> {
        self.check_dataset(train)?;
        self.check_dataset(test)?;
        let adversarial = self.config.adversarial();
        let first_epoch = self.start_epoch;
        info!(
            first_epoch,
            epochs = self.config.epochs,
            adversarial,
            levels = self.encoder.levels(),
            "starting run"
        );
        let mut history = Vec::with_capacity(2 * self.config.epochs);
        for epoch in first_epoch..first_epoch + self.config.epochs {
            if adversarial {
                history.push(self.advtrain(epoch, train)?);
                history.push(self.advtest(epoch, test)?);
            } else {
                history.push(self.train(epoch, train)?);
                history.push(self.test(epoch, test)?);
            }
            self.scheduler.step(&mut self.optimizer)?;
            debug!(epoch, learning_rate = self.optimizer.learning_rate(), "scheduler step");
        }
        self.start_epoch = first_epoch + self.config.epochs;
        Ok(RunSummary {
            first_epoch,
            epochs_run: self.config.epochs,
            best_accuracy: self.keeper.best_accuracy(),
            history,
        })
    }

    /// One clean training epoch over shuffled, augmented batches.
    pub fn train(&mut self, epoch: usize, data: &Dataset) -> TrainResult<EpochSummary> {
        info!(epoch, "train");
        let mut stats = RunningStats::new();
        for (batch_idx, indices) in data
            .batch_indices(self.config.train_batch, Some(&mut self.rng))
            .into_iter()
            .enumerate()
        {
            let (images, labels) = self.training_batch(data, &indices)?;
            let codes = self.encoder.encode_batch(&images, EncodingMode::Thermometer)?;
            let (loss, predictions) = self.fit_batch(&codes, &labels)?;
            stats.record(loss, &predictions, &labels);
            log_batch(Phase::Train, batch_idx, &stats);
        }
        self.finish_phase(epoch, Phase::Train, &stats)
    }

    /// One clean evaluation pass; checkpoints on a new best accuracy.
    pub fn test(&mut self, epoch: usize, data: &Dataset) -> TrainResult<EpochSummary> {
        let mut stats = RunningStats::new();
        for (batch_idx, indices) in data
            .batch_indices(self.config.test_batch, None)
            .into_iter()
            .enumerate()
        {
            let (images, labels) = data.batch(&indices)?;
            let codes = self.encoder.encode_batch(&images, EncodingMode::Thermometer)?;
            let (loss, predictions) = self.evaluate_batch(&codes, &labels)?;
            stats.record(loss, &predictions, &labels);
            log_batch(Phase::Test, batch_idx, &stats);
        }
        let summary = self.finish_phase(epoch, Phase::Test, &stats)?;
        self.keeper.consider(
            &self.model,
            CheckpointPolicy::BestOnly,
            summary.accuracy,
            epoch,
            self.encoder.levels(),
        )?;
        Ok(summary)
    }

    /// One adversarial training epoch. The first batch's last few
    /// adversarial images are decoded and sent to the sink.
    pub fn advtrain(&mut self, epoch: usize, data: &Dataset) -> TrainResult<EpochSummary> {
        info!(epoch, "advtrain");
        let mut stats = RunningStats::new();
        for (batch_idx, indices) in data
            .batch_indices(self.config.train_batch, Some(&mut self.rng))
            .into_iter()
            .enumerate()
        {
            let (images, labels) = self.training_batch(data, &indices)?;
            let codes = self.adversarial_codes(&images, &labels)?;
            let (loss, predictions) = self.fit_batch(&codes, &labels)?;
            stats.record(loss, &predictions, &labels);
            if batch_idx == 0 {
                self.visualise(&codes, epoch)?;
            }
            log_batch(Phase::AdvTrain, batch_idx, &stats);
        }
        self.finish_phase(epoch, Phase::AdvTrain, &stats)
    }

    /// One adversarial evaluation pass; the checkpoint is written after
    /// every pass.
    pub fn advtest(&mut self, epoch: usize, data: &Dataset) -> TrainResult<EpochSummary> {
        let mut stats = RunningStats::new();
        for (batch_idx, indices) in data
            .batch_indices(self.config.test_batch, None)
            .into_iter()
            .enumerate()
        {
            let (images, labels) = data.batch(&indices)?;
            let codes = self.adversarial_codes(&images, &labels)?;
            let (loss, predictions) = self.evaluate_batch(&codes, &labels)?;
            stats.record(loss, &predictions, &labels);
            log_batch(Phase::AdvTest, batch_idx, &stats);
        }
        let summary = self.finish_phase(epoch, Phase::AdvTest, &stats)?;
        self.keeper.consider(
            &self.model,
            CheckpointPolicy::EveryPass,
            summary.accuracy,
            epoch,
            self.encoder.levels(),
        )?;
        Ok(summary)
    }

    fn check_dataset(&self, data: &Dataset) -> TrainResult<()> {
        if data.height() != self.height || data.width() != self.width {
            return Err(TrainError::ImageShape {
                height: self.height,
                width: self.width,
                found_height: data.height(),
                found_width: data.width(),
            });
        }
        Ok(())
    }

    fn training_batch(
        &mut self,
        data: &Dataset,
        indices: &[usize],
    ) -> TrainResult<(ImageBatch, Vec<usize>)> {
        let (images, labels) = data.batch(indices)?;
        let images = match &self.augmenter {
            Some(augmenter) => augmenter.apply(&images, &mut self.rng)?,
            None => images,
        };
        Ok((images, labels))
    }

    fn adversarial_codes(
        &mut self,
        images: &ImageBatch,
        labels: &[usize],
    ) -> TrainResult<Vec<LevelCode>> {
        let oracle = ClassifierOracle::new(&self.model, self.loss);
        Ok(self.attacker.attack(&oracle, images, labels)?)
    }

    fn fit_batch(&mut self, codes: &[LevelCode], labels: &[usize]) -> TrainResult<(f32, Vec<usize>)> {
        let input = self.model.assemble(codes)?;
        let targets = one_hot_targets(labels, NUM_CLASSES)?;
        self.optimizer.zero_grad(&mut self.model)?;
        let logits = self.model.forward(&input)?;
        let loss = self.loss.forward(&logits, &targets)?.data()[0];
        if !loss.is_finite() {
            warn!(loss, "non-finite training loss");
        }
        let grad = self.loss.backward(&logits, &targets)?;
        self.model.backward(&input, &grad)?;
        self.optimizer.step(&mut self.model)?;
        Ok((loss, logits.argmax_rows()))
    }

    fn evaluate_batch(
        &mut self,
        codes: &[LevelCode],
        labels: &[usize],
    ) -> TrainResult<(f32, Vec<usize>)> {
        let input = self.model.assemble(codes)?;
        let targets = one_hot_targets(labels, NUM_CLASSES)?;
        let logits = self.model.forward(&input)?;
        let loss = self.loss.forward(&logits, &targets)?.data()[0];
        Ok((loss, logits.argmax_rows()))
    }

    fn visualise(&mut self, codes: &[LevelCode], epoch: usize) -> TrainResult<()> {
        let batch = codes.first().map_or(0, LevelCode::batch);
        let tail: Vec<usize> = (batch.saturating_sub(GRID_SAMPLES)..batch).collect();
        let selected = codes
            .iter()
            .map(|code| code.select(&tail))
            .collect::<Result<Vec<_>, _>>()?;
        let images = self.encoder.decode_batch(&selected, self.height, self.width)?;
        let grid = make_grid(&images, GRID_NROW, GRID_PADDING)?;
        self.sink.add_image("Image", &grid, epoch)
    }

    fn finish_phase(
        &mut self,
        epoch: usize,
        phase: Phase,
        stats: &RunningStats,
    ) -> TrainResult<EpochSummary> {
        let summary = EpochSummary::from_stats(epoch, phase, stats);
        info!(
            epoch,
            phase = phase.as_str(),
            loss = summary.loss,
            accuracy = summary.accuracy,
            correct = summary.correct,
            total = summary.total,
            "epoch finished"
        );
        self.sink.add_scalars(&summary)?;
        Ok(summary)
    }
}

fn log_batch(phase: Phase, batch_idx: usize, stats: &RunningStats) {
    debug!(
        phase = phase.as_str(),
        batch = batch_idx,
        loss = stats.mean_loss(),
        accuracy = stats.accuracy(),
        correct = stats.correct(),
        total = stats.total(),
        "batch"
    );
}
