// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct StoredTensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl StoredTensor {
    fn from_tensor(tensor: &Tensor) -> StoredTensor {
        StoredTensor {
            rows: tensor.shape().0,
            cols: tensor.shape().1,
            data: tensor.data().to_vec(),
        }
    }

    fn into_tensor(self) -> PureResult<Tensor> {
        Tensor::from_vec(self.rows, self.cols, self.data)
    }
}

/// Serialisable copy of a module's parameters, keyed by parameter name.
/// Embedded by higher-level records such as training checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    parameters: HashMap<String, StoredTensor>,
}

impl StateSnapshot {
    /// Captures the current parameters of `module`.
    pub fn capture<M: Module + ?Sized>(module: &M) -> PureResult<Self> {
        Ok(Self::from_state(&module.state_dict()?))
    }

    /// Builds a snapshot from an existing state dictionary.
    pub fn from_state(state: &HashMap<String, Tensor>) -> Self {
        let parameters = state
            .iter()
            .map(|(name, tensor)| (name.clone(), StoredTensor::from_tensor(tensor)))
            .collect();
        Self { parameters }
    }

    /// Number of stored parameter tensors.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Converts back into a state dictionary, validating every shape.
    pub fn into_state(self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::with_capacity(self.parameters.len());
        for (name, tensor) in self.parameters {
            state.insert(name, tensor.into_tensor()?);
        }
        Ok(state)
    }

    /// Loads the snapshot into `module`.
    pub fn restore<M: Module + ?Sized>(self, module: &mut M) -> PureResult<()> {
        let state = self.into_state()?;
        module.load_state_dict(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::linear::Linear;
    use crate::TensorError;

    #[test]
    fn snapshot_survives_bincode_and_restores_weights() {
        let mut layer = Linear::with_seed("io", 2, 2, Some(1)).unwrap();
        let before = layer.state_dict().unwrap();
        let bytes = bincode::serialize(&StateSnapshot::capture(&layer).unwrap()).unwrap();

        let input = Tensor::from_vec(1, 2, vec![1.0, 1.0]).unwrap();
        let grad = Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        layer.backward(&input, &grad).unwrap();
        layer.apply_step(0.5).unwrap();
        assert_ne!(before, layer.state_dict().unwrap());

        let snapshot: StateSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(snapshot.len(), 2);
        snapshot.restore(&mut layer).unwrap();
        assert_eq!(before, layer.state_dict().unwrap());
    }

    #[test]
    fn restoring_into_a_different_module_reports_missing_parameter() {
        let source = Linear::with_seed("a", 2, 2, Some(3)).unwrap();
        let mut target = Linear::with_seed("b", 2, 2, Some(4)).unwrap();
        let snapshot = StateSnapshot::capture(&source).unwrap();
        assert!(matches!(
            snapshot.restore(&mut target),
            Err(TensorError::MissingParameter { .. })
        ));
    }

    #[test]
    fn corrupted_shapes_are_rejected() {
        let mut state = HashMap::new();
        state.insert("w".to_string(), Tensor::zeros(2, 2).unwrap());
        let mut snapshot = StateSnapshot::from_state(&state);
        if let Some(stored) = snapshot.parameters.get_mut("w") {
            stored.data.pop();
        }
        assert!(snapshot.into_state().is_err());
        assert!(StateSnapshot::default().is_empty());
    }
}
