// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use clap::{ArgAction, Parser, ValueHint};
use std::error::Error;
use std::path::PathBuf;
use thermo_config::{determinism, tracing as trace};
use thermo_train::{DataSource, Dataset, PngSink, RunConfig, Split, TrainingSession};
use tracing::info;

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Train a CIFAR-10 classifier on thermometer-encoded inputs"
)]
struct Cli {
    /// TOML or JSON run configuration; flags below override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f32>,

    /// Image quantization level
    #[arg(long)]
    level: Option<usize>,

    /// Resume from checkpoint
    #[arg(long, short = 'r', action = ArgAction::SetTrue)]
    resume: bool,

    /// Steps of attack; 0 trains without the adversary
    #[arg(long, short = 's')]
    step: Option<usize>,

    /// Directory for image grids and scalar logs
    #[arg(long, value_hint = ValueHint::DirPath)]
    log: Option<PathBuf>,

    /// Number of epochs to run
    #[arg(long)]
    epochs: Option<usize>,

    /// Directory holding the CIFAR-10 binary batches
    #[arg(long, value_hint = ValueHint::DirPath)]
    data_dir: Option<PathBuf>,

    /// Use a seeded synthetic dataset with this many training images
    #[arg(long, conflicts_with = "data_dir")]
    synthetic: Option<usize>,

    /// Seed for weights, shuffling, augmentation and the attack
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if let Some(level) = self.level {
            config.levels = level;
        }
        if self.resume {
            config.resume = true;
        }
        if let Some(step) = self.step {
            config.attack.steps = step;
        }
        if let Some(log) = self.log {
            config.log_dir = log;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(dir) = self.data_dir {
            config.data = DataSource::Cifar10 { dir };
        }
        if let Some(train) = self.synthetic {
            config.data = DataSource::Synthetic {
                train,
                test: (train / 5).max(1),
                height: 32,
                width: 32,
            };
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        trace::flush_tracing();
        std::process::exit(1);
    }
    trace::flush_tracing();
}

fn try_main() -> Result<()> {
    trace::init_tracing()?;
    let config = Cli::parse().into_config()?;
    let seed = config.seed.or_else(|| {
        let det = determinism::config();
        det.enabled.then_some(det.base_seed)
    });

    let (train, test) = match &config.data {
        DataSource::Cifar10 { dir } => (
            Dataset::cifar10(dir, Split::Train)?,
            Dataset::cifar10(dir, Split::Test)?,
        ),
        DataSource::Synthetic {
            train,
            test,
            height,
            width,
        } => (
            Dataset::synthetic(*train, *height, *width, seed)?,
            Dataset::synthetic(*test, *height, *width, seed.map(|s| s.wrapping_add(1)))?,
        ),
    };

    let sink = PngSink::new(config.log_dir.clone());
    let mut session = TrainingSession::new(config, train.height(), train.width(), Box::new(sink))?;
    info!(?session, "session ready");
    let summary = session.run(&train, &test)?;
    info!(
        epochs = summary.epochs_run,
        best_accuracy = summary.best_accuracy,
        "run finished"
    );
    Ok(())
}
