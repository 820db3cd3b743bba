// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

const ENABLED_VAR: &str = "THERMO_DETERMINISTIC";
const SEED_VAR: &str = "THERMO_DETERMINISTIC_SEED";
const REDUCTION_VAR: &str = "THERMO_DETERMINISTIC_REDUCTION";

/// Deterministic runtime configuration shared by weight init, shuffling,
/// augmentation and the adversarial search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterminismConfig {
    /// Whether deterministic execution is enabled globally.
    pub enabled: bool,
    /// Base seed used to derive per-component seeds.
    pub base_seed: u64,
    /// If true rayon is pinned to a single worker so reductions keep their order.
    pub fix_reduction: bool,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_seed: 42,
            fix_reduction: false,
        }
    }
}

impl DeterminismConfig {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. `from_env` routes
    /// through here; tests feed a map instead of mutating the process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(ENABLED_VAR)
            .map(|v| !matches!(v.as_str(), "0" | "false" | "False" | "off" | "OFF"))
            .unwrap_or(false);

        let base_seed = lookup(SEED_VAR)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(42);

        let fix_reduction = lookup(REDUCTION_VAR)
            .map(|v| matches!(v.as_str(), "1" | "true" | "True" | "on" | "ON"))
            .unwrap_or(enabled);

        Self {
            enabled,
            base_seed,
            fix_reduction,
        }
    }

    /// Derives a deterministic seed for a given component label.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// Returns the lazily initialised deterministic configuration.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| {
        let cfg = DeterminismConfig::from_env();
        apply_process_hints(&cfg);
        cfg
    })
}

fn apply_process_hints(cfg: &DeterminismConfig) {
    if cfg.enabled && cfg.fix_reduction {
        // Only effective if no rayon pool has been built yet.
        std::env::set_var("RAYON_NUM_THREADS", "1");
    }
}

/// Returns a RNG derived from the provided label. When determinism is disabled
/// this falls back to a random seed from the operating system.
pub fn rng_from_label(label: &str) -> StdRng {
    let cfg = config();
    if cfg.enabled {
        StdRng::seed_from_u64(cfg.seed_for(label))
    } else {
        StdRng::from_entropy()
    }
}

/// Returns a RNG seeded from an optional explicit seed, respecting deterministic
/// overrides when the seed is not provided.
pub fn rng_from_optional(seed: Option<u64>, label: &str) -> StdRng {
    match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => rng_from_label(label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_disable_determinism() {
        let cfg = DeterminismConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg, DeterminismConfig::default());
    }

    #[test]
    fn explicit_enables_override_defaults() {
        let cfg = DeterminismConfig::from_lookup(lookup(&[
            (ENABLED_VAR, "1"),
            (SEED_VAR, "1337"),
            (REDUCTION_VAR, "0"),
        ]));
        assert!(cfg.enabled);
        assert_eq!(cfg.base_seed, 1337);
        assert!(!cfg.fix_reduction);
    }

    #[test]
    fn textual_false_values_disable_flags() {
        let cfg = DeterminismConfig::from_lookup(lookup(&[(ENABLED_VAR, "off")]));
        assert!(!cfg.enabled);
    }

    #[test]
    fn reduction_follows_enabled_when_unspecified() {
        let cfg = DeterminismConfig::from_lookup(lookup(&[(ENABLED_VAR, "true")]));
        assert!(cfg.fix_reduction);
    }

    #[test]
    fn derived_seeds_are_stable_per_label() {
        let cfg = DeterminismConfig::from_lookup(lookup(&[(ENABLED_VAR, "1"), (SEED_VAR, "99")]));
        assert_eq!(cfg.seed_for("alpha"), cfg.seed_for("alpha"));
        assert_ne!(cfg.seed_for("alpha"), cfg.seed_for("beta"));
    }

    #[test]
    fn explicit_seed_wins_over_label() {
        let a: u64 = rng_from_optional(Some(7), "lspga").gen();
        let b: u64 = rng_from_optional(Some(7), "shuffle").gen();
        assert_eq!(a, b);
    }
}
