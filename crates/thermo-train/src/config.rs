// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Run configuration.
//!
//! Every field has a default, so a configuration file only needs to name the
//! values it changes. Files ending in `.toml` are parsed as TOML, `.json` as
//! JSON; command-line flags are applied on top by the caller.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thermo_encoding::{LsPgaConfig, DEFAULT_LEVELS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse JSON {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported configuration format {path:?} (expected .toml or .json)")]
    UnsupportedFormat { path: PathBuf },
    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Where the images come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// CIFAR-10 binary batches in `dir`.
    Cifar10 { dir: PathBuf },
    /// Seeded random images, for smoke runs.
    Synthetic {
        train: usize,
        test: usize,
        height: usize,
        width: usize,
    },
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Cifar10 {
            dir: PathBuf::from("../data/cifar10"),
        }
    }
}

/// Hyperparameters of the adversary used in adversarial mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackSettings {
    /// Ascent steps; `0` selects clean training for the whole run.
    pub steps: usize,
    pub epsilon: f32,
    pub delta: f32,
    pub xi: f32,
}

impl Default for AttackSettings {
    fn default() -> Self {
        let lspga = LsPgaConfig::default();
        Self {
            steps: lspga.steps,
            epsilon: lspga.epsilon,
            delta: lspga.delta,
            xi: lspga.xi,
        }
    }
}

impl AttackSettings {
    pub fn lspga(&self, seed: Option<u64>) -> LsPgaConfig {
        LsPgaConfig {
            epsilon: self.epsilon,
            steps: self.steps,
            delta: self.delta,
            xi: self.xi,
            seed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub learning_rate: f32,
    pub momentum: f32,
    pub weight_decay: f32,
    /// Epochs between learning-rate decays.
    pub lr_step: usize,
    pub lr_gamma: f32,
    /// Quantization level `k`.
    pub levels: usize,
    pub resume: bool,
    pub attack: AttackSettings,
    pub log_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub epochs: usize,
    pub train_batch: usize,
    pub test_batch: usize,
    pub hidden: usize,
    pub augment: bool,
    pub data: DataSource,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            momentum: 0.9,
            weight_decay: 5e-4,
            lr_step: 30,
            lr_gamma: 0.1,
            levels: DEFAULT_LEVELS,
            resume: false,
            attack: AttackSettings::default(),
            log_dir: PathBuf::from("them/res50"),
            checkpoint_dir: PathBuf::from("checkpoint"),
            epochs: 200,
            train_batch: 256,
            test_batch: 100,
            hidden: 256,
            augment: true,
            data: DataSource::default(),
            seed: None,
        }
    }
}

impl RunConfig {
    /// Loads a configuration file, choosing the parser from the extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?,
            Some("json") => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Whether the run trains against the adversary.
    pub fn adversarial(&self) -> bool {
        self.attack.steps > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }
        if self.levels == 0 {
            return Err(invalid("levels", "quantization level must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(invalid("momentum", format!("must be in [0, 1), got {}", self.momentum)));
        }
        if self.weight_decay < 0.0 {
            return Err(invalid("weight_decay", "must not be negative"));
        }
        if self.lr_step == 0 {
            return Err(invalid("lr_step", "must be positive"));
        }
        if !(self.lr_gamma.is_finite() && self.lr_gamma > 0.0) {
            return Err(invalid("lr_gamma", format!("must be positive, got {}", self.lr_gamma)));
        }
        if self.train_batch == 0 || self.test_batch == 0 {
            return Err(invalid("train_batch", "batch sizes must be positive"));
        }
        if self.hidden == 0 {
            return Err(invalid("hidden", "must be positive"));
        }
        if !(self.attack.epsilon.is_finite() && self.attack.epsilon >= 0.0) {
            return Err(invalid("attack.epsilon", "must be a non-negative number"));
        }
        if !(self.attack.delta.is_finite() && self.attack.delta > 0.0) {
            return Err(invalid(
                "attack.delta",
                format!("temperature decay must be positive, got {}", self.attack.delta),
            ));
        }
        if !(self.attack.xi.is_finite() && self.attack.xi >= 0.0) {
            return Err(invalid(
                "attack.xi",
                format!("step size must be non-negative, got {}", self.attack.xi),
            ));
        }
        if let DataSource::Synthetic {
            train,
            test,
            height,
            width,
        } = &self.data
        {
            if *train == 0 || *test == 0 || *height == 0 || *width == 0 {
                return Err(invalid("data", "synthetic dataset dimensions must be positive"));
            }
        }
        Ok(())
    }

    /// Path of the single checkpoint file.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_dir.join(crate::checkpoint::CHECKPOINT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_follow_reference_run() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.levels, 15);
        assert_eq!(cfg.attack.steps, 7);
        assert_eq!(cfg.train_batch, 256);
        assert_eq!(cfg.test_batch, 100);
        assert!(cfg.adversarial());
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "levels = 8\nepochs = 3\n[attack]\nsteps = 0\n[data]\nkind = \"synthetic\"\ntrain = 8\ntest = 4\nheight = 4\nwidth = 4"
        )
        .unwrap();
        let cfg = RunConfig::load(file.path()).unwrap();
        assert_eq!(cfg.levels, 8);
        assert_eq!(cfg.epochs, 3);
        assert!(!cfg.adversarial());
        assert_eq!(cfg.attack.epsilon, 0.032);
        assert_eq!(cfg.learning_rate, 0.1);
        assert!(matches!(cfg.data, DataSource::Synthetic { train: 8, .. }));
    }

    #[test]
    fn json_is_accepted_and_validated() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{\"levels\": 0}}").unwrap();
        assert!(matches!(
            RunConfig::load(file.path()),
            Err(ConfigError::Invalid { field: "levels", .. })
        ));
    }

    #[test]
    fn schedule_and_attack_knobs_are_validated() {
        let cases = [
            (
                "lr_gamma",
                RunConfig {
                    lr_gamma: 0.0,
                    ..RunConfig::default()
                },
            ),
            (
                "attack.delta",
                RunConfig {
                    attack: AttackSettings {
                        delta: -1.2,
                        ..AttackSettings::default()
                    },
                    ..RunConfig::default()
                },
            ),
            (
                "attack.xi",
                RunConfig {
                    attack: AttackSettings {
                        xi: f32::NAN,
                        ..AttackSettings::default()
                    },
                    ..RunConfig::default()
                },
            ),
        ];
        for (expected, cfg) in cases {
            match cfg.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            RunConfig::load(file.path()),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }
}
