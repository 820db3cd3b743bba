// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pure Rust dense tensors with only lightweight external dependencies.
//!
//! Every tensor is a row-major `rows × cols` matrix of `f32`. Higher-rank
//! layouts (image batches, level codes) are flattened into the column axis by
//! the crates that own them, so this module only has to get the 2D kernels
//! right.

use core::fmt;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::error::Error;
use std::sync::Arc;
use thermo_config::determinism;

/// Result alias used throughout the pure module.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor utilities and the layers built on top of them.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorError {
    /// A tensor constructor received an invalid shape.
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor or operator does not match the tensor shape.
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Learning rate must be positive for optimizers.
    NonPositiveLearningRate { rate: f32 },
    /// Computation received an empty input which would otherwise trigger a panic.
    EmptyInput(&'static str),
    /// Attempted to load or update a parameter that was missing from the state dict.
    MissingParameter { name: String },
    /// Numeric guard detected a non-finite value that would otherwise propagate NaNs.
    NonFiniteValue { label: &'static str, value: f32 },
    /// Generic configuration violation.
    InvalidValue { label: &'static str },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::InvalidDimensions { rows, cols } => {
                write!(
                    f,
                    "invalid tensor dimensions ({rows} x {cols}); both axes must be non-zero"
                )
            }
            TensorError::DataLength { expected, got } => {
                write!(f, "data length mismatch: expected {expected}, got {got}")
            }
            TensorError::ShapeMismatch { left, right } => {
                write!(
                    f,
                    "shape mismatch: left={:?}, right={:?} cannot be combined",
                    left, right
                )
            }
            TensorError::NonPositiveLearningRate { rate } => {
                write!(f, "learning rate must be positive, got {rate}")
            }
            TensorError::EmptyInput(label) => {
                write!(f, "{label} must not be empty for this computation")
            }
            TensorError::MissingParameter { name } => {
                write!(f, "missing parameter '{name}' while loading module state")
            }
            TensorError::NonFiniteValue { label, value } => {
                write!(f, "non-finite value detected for {label}: {value}")
            }
            TensorError::InvalidValue { label } => {
                write!(f, "invalid value: {label}")
            }
        }
    }
}

impl Error for TensorError {}

/// Rows below this count are multiplied on the calling thread.
const PARALLEL_ROW_THRESHOLD: usize = 16;

/// Dense row-major matrix. The buffer is shared copy-on-write so cloning a
/// tensor to keep an activation around is cheap.
#[derive(Clone, Debug)]
pub struct Tensor {
    data: Arc<Vec<f32>>,
    rows: usize,
    cols: usize,
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.data == other.data
    }
}

impl Tensor {
    fn seedable_rng(seed: Option<u64>, label: &str) -> StdRng {
        determinism::rng_from_optional(seed, label)
    }

    fn check_dims(rows: usize, cols: usize) -> PureResult<()> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        Ok(())
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        Self::filled(rows, cols, 0.0)
    }

    /// Create a tensor where every element holds `value`.
    pub fn filled(rows: usize, cols: usize, value: f32) -> PureResult<Self> {
        Self::check_dims(rows, cols)?;
        Ok(Self {
            data: Arc::new(vec![value; rows * cols]),
            rows,
            cols,
        })
    }

    /// Create a tensor from raw data. The provided vector must match
    /// `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        Self::check_dims(rows, cols)?;
        if data.len() != rows * cols {
            return Err(TensorError::DataLength {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self {
            data: Arc::new(data),
            rows,
            cols,
        })
    }

    /// Construct a tensor by sampling a uniform distribution in `[min, max)`.
    ///
    /// When `seed` is provided the RNG becomes deterministic which makes tests
    /// reproducible. Otherwise the determinism config decides.
    pub fn random_uniform(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        Self::check_dims(rows, cols)?;
        if !(min < max) {
            return Err(TensorError::InvalidValue {
                label: "random_uniform_bounds",
            });
        }
        let mut rng = Self::seedable_rng(seed, "thermo-tensor/tensor/uniform");
        let distribution = Uniform::new(min, max);
        let data = (0..rows * cols)
            .map(|_| distribution.sample(&mut rng))
            .collect();
        Self::from_vec(rows, cols, data)
    }

    /// Construct a tensor by sampling a normal distribution with the provided
    /// mean and standard deviation.
    pub fn random_normal(
        rows: usize,
        cols: usize,
        mean: f32,
        std: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        Self::check_dims(rows, cols)?;
        if std <= 0.0 || !std.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "random_normal_std",
            });
        }
        let mut rng = Self::seedable_rng(seed, "thermo-tensor/tensor/normal");
        let data = (0..rows * cols)
            .map(|_| {
                let sample: f64 = StandardNormal.sample(&mut rng);
                mean + std * sample as f32
            })
            .collect();
        Self::from_vec(rows, cols, data)
    }

    /// Construct a tensor by applying a generator function to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        Self::check_dims(rows, cols)?;
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::from_vec(rows, cols, data)
    }

    /// Returns the `(rows, cols)` pair of the tensor.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of elements stored in the tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Tensors always hold at least one element; kept for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable view of the row-major buffer.
    pub fn data(&self) -> &[f32] {
        self.data.as_slice()
    }

    /// Mutable view of the row-major buffer (clones when shared).
    pub fn data_mut(&mut self) -> &mut [f32] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Borrow a single row.
    pub fn row(&self, index: usize) -> PureResult<&[f32]> {
        if index >= self.rows {
            return Err(TensorError::InvalidValue { label: "row_index" });
        }
        let start = index * self.cols;
        Ok(&self.data[start..start + self.cols])
    }

    /// Matrix multiply `self (m × n) · other (n × p)`. Rows of the output are
    /// computed in parallel once the batch is large enough.
    pub fn matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let inner = self.cols;
        let cols = other.cols;
        let lhs = self.data();
        let rhs = other.data();
        let mut out = vec![0.0f32; self.rows * cols];
        let kernel = |(r, dst): (usize, &mut [f32])| {
            let row = &lhs[r * inner..(r + 1) * inner];
            for (k, &a) in row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs[k * cols..(k + 1) * cols];
                for (d, &b) in dst.iter_mut().zip(rhs_row) {
                    *d += a * b;
                }
            }
        };
        if self.rows >= PARALLEL_ROW_THRESHOLD {
            out.par_chunks_mut(cols).enumerate().for_each(kernel);
        } else {
            out.chunks_mut(cols).enumerate().for_each(kernel);
        }
        Tensor::from_vec(self.rows, cols, out)
    }

    /// Returns the transpose of the tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0f32; self.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            data: Arc::new(data),
            rows: self.cols,
            cols: self.rows,
        }
    }

    fn zip_with(&self, other: &Tensor, op: impl Fn(f32, f32) -> f32) -> PureResult<Tensor> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| op(a, b))
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Returns a new tensor where every element is scaled by `value`.
    pub fn scale(&self, value: f32) -> PureResult<Tensor> {
        let data = self.data.iter().map(|&a| a * value).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Add a scaled tensor to this tensor (`self += scale * other`).
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let data = Arc::make_mut(&mut self.data);
        for (a, b) in data.iter_mut().zip(other.data.iter()) {
            *a += scale * b;
        }
        Ok(())
    }

    /// Add the provided row vector to every row (`self[row] += bias`).
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> PureResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        let cols = self.cols;
        let data = Arc::make_mut(&mut self.data);
        for row in data.chunks_mut(cols) {
            for (value, b) in row.iter_mut().zip(bias) {
                *value += b;
            }
        }
        Ok(())
    }

    /// Returns the sum over rows for each column.
    pub fn sum_axis0(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for row in self.data.chunks(self.cols) {
            for (s, v) in sums.iter_mut().zip(row) {
                *s += v;
            }
        }
        sums
    }

    /// Computes the squared L2 norm of the tensor.
    pub fn squared_l2_norm(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Numerically stable row-wise softmax.
    pub fn row_softmax(&self) -> PureResult<Tensor> {
        let mut data = Vec::with_capacity(self.len());
        for row in self.data.chunks(self.cols) {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if !max.is_finite() {
                return Err(TensorError::NonFiniteValue {
                    label: "row_softmax",
                    value: max,
                });
            }
            let start = data.len();
            let mut total = 0.0f32;
            for &v in row {
                let e = (v - max).exp();
                total += e;
                data.push(e);
            }
            for v in &mut data[start..] {
                *v /= total;
            }
        }
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Index of the largest value per row. Ties resolve to the first index.
    pub fn argmax_rows(&self) -> Vec<usize> {
        self.data
            .chunks(self.cols)
            .map(|row| {
                let mut best = 0usize;
                for (idx, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = idx;
                    }
                }
                best
            })
            .collect()
    }

    /// Concatenates tensors column-wise. All inputs must share the row count.
    pub fn cat_cols(tensors: &[Tensor]) -> PureResult<Tensor> {
        let Some(first) = tensors.first() else {
            return Err(TensorError::EmptyInput("Tensor::cat_cols"));
        };
        let rows = first.rows;
        let mut total_cols = 0usize;
        for tensor in tensors {
            if tensor.rows != rows {
                return Err(TensorError::ShapeMismatch {
                    left: first.shape(),
                    right: tensor.shape(),
                });
            }
            total_cols += tensor.cols;
        }
        let mut data = Vec::with_capacity(rows * total_cols);
        for r in 0..rows {
            for tensor in tensors {
                let start = r * tensor.cols;
                data.extend_from_slice(&tensor.data[start..start + tensor.cols]);
            }
        }
        Tensor::from_vec(rows, total_cols, data)
    }

    /// Splits the tensor column-wise into consecutive blocks of the given widths.
    pub fn split_cols(&self, widths: &[usize]) -> PureResult<Vec<Tensor>> {
        let total: usize = widths.iter().sum();
        if total != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: total,
            });
        }
        let mut out = Vec::with_capacity(widths.len());
        let mut offset = 0usize;
        for &width in widths {
            let mut data = Vec::with_capacity(self.rows * width);
            for row in self.data.chunks(self.cols) {
                data.extend_from_slice(&row[offset..offset + width]);
            }
            out.push(Tensor::from_vec(self.rows, width, data)?);
            offset += width;
        }
        Ok(out)
    }

    /// Gathers the listed rows, in order, into a new tensor.
    pub fn select_rows(&self, indices: &[usize]) -> PureResult<Tensor> {
        if indices.is_empty() {
            return Err(TensorError::EmptyInput("Tensor::select_rows"));
        }
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &idx in indices {
            data.extend_from_slice(self.row(idx)?);
        }
        Tensor::from_vec(indices.len(), self.cols, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constructors_validate_shape() {
        assert!(matches!(
            Tensor::zeros(0, 3),
            Err(TensorError::InvalidDimensions { rows: 0, cols: 3 })
        ));
        assert!(matches!(
            Tensor::from_vec(2, 2, vec![1.0; 3]),
            Err(TensorError::DataLength {
                expected: 4,
                got: 3
            })
        ));
    }

    #[test]
    fn matmul_matches_manual_product() {
        let a = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Tensor::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
        assert!(a.matmul(&a).is_err());
    }

    #[test]
    fn parallel_matmul_agrees_with_transpose_identity() {
        let a = Tensor::random_normal(40, 7, 0.0, 1.0, Some(3)).unwrap();
        let b = Tensor::random_normal(7, 5, 0.0, 1.0, Some(4)).unwrap();
        let ab_t = a.matmul(&b).unwrap().transpose();
        let bt_at = b.transpose().matmul(&a.transpose()).unwrap();
        for (x, y) in ab_t.data().iter().zip(bt_at.data()) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn row_softmax_is_normalised_and_stable() {
        let t = Tensor::from_vec(2, 3, vec![1000.0, 1000.0, 1000.0, 0.0, 1.0, 2.0]).unwrap();
        let s = t.row_softmax().unwrap();
        for row in s.data().chunks(3) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
        assert!((s.data()[0] - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(s.argmax_rows(), vec![0, 2]);
    }

    #[test]
    fn cat_and_split_cols_are_inverse() {
        let a = Tensor::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_vec(2, 1, vec![5.0, 6.0]).unwrap();
        let joined = Tensor::cat_cols(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined.data(), &[1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
        let parts = joined.split_cols(&[2, 1]).unwrap();
        assert_eq!(parts, vec![a, b]);
    }

    #[test]
    fn clones_are_copy_on_write() {
        let a = Tensor::zeros(1, 2).unwrap();
        let mut b = a.clone();
        b.data_mut()[0] = 1.0;
        assert_eq!(a.data(), &[0.0, 0.0]);
        assert_eq!(b.data(), &[1.0, 0.0]);
    }

    #[test]
    fn seeded_normal_is_reproducible() {
        let a = Tensor::random_normal(3, 3, 0.0, 1.0, Some(11)).unwrap();
        let b = Tensor::random_normal(3, 3, 0.0, 1.0, Some(11)).unwrap();
        assert_eq!(a, b);
        assert!(Tensor::random_normal(3, 3, 0.0, 0.0, None).is_err());
    }

    proptest! {
        #[test]
        fn column_sums_match_total(values in proptest::collection::vec(-10.0f32..10.0, 12)) {
            let t = Tensor::from_vec(3, 4, values.clone()).unwrap();
            let by_cols: f32 = t.sum_axis0().iter().sum();
            let total: f32 = values.iter().sum();
            prop_assert!((by_cols - total).abs() < 1e-3);
        }

        #[test]
        fn sub_then_add_scaled_restores(values in proptest::collection::vec(-10.0f32..10.0, 6)) {
            let a = Tensor::from_vec(2, 3, values).unwrap();
            let b = Tensor::filled(2, 3, 0.25).unwrap();
            let mut diff = a.sub(&b).unwrap();
            diff.add_scaled(&b, 1.0).unwrap();
            for (x, y) in diff.data().iter().zip(a.data()) {
                prop_assert!((x - y).abs() < 1e-5);
            }
        }
    }
}
