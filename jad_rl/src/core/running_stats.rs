//! Running statistics using the parallel form of Welford's algorithm.
//!
//! Every update is a merge of a batch's (mean, population variance, count)
//! into the running triple. Feeding a dataset as one batch or as many small
//! batches produces the same statistics up to floating-point rounding.
//!
//! # Example
//! ```ignore
//! use jad_rl::core::RunningNormalizer;
//!
//! let mut stats = RunningNormalizer::new(2);
//! stats.update(&[1.0, 2.0, 3.0, 4.0]); // two rows of two features
//! let normalized = stats.normalize(&[2.0, 3.0]);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default epsilon added to the variance before taking the square root.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Error returned when restoring statistics from persisted parts.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// `mean` and `var` have different lengths.
    ShapeMismatch { mean: usize, var: usize },
    /// A variance entry is negative or not finite.
    InvalidVariance { index: usize, value: f64 },
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::ShapeMismatch { mean, var } => {
                write!(f, "mean has {} entries but var has {}", mean, var)
            }
            StatsError::InvalidVariance { index, value } => {
                write!(f, "variance at index {} must be finite and >= 0, got {}", index, value)
            }
        }
    }
}

impl std::error::Error for StatsError {}

/// Running mean and variance over a fixed set of features.
///
/// Starts at mean 0, variance 1, count 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningNormalizer {
    mean: Vec<f64>,
    var: Vec<f64>,
    count: u64,
    epsilon: f64,
}

impl RunningNormalizer {
    /// Create statistics for `dim` features.
    pub fn new(dim: usize) -> Self {
        Self::with_epsilon(dim, DEFAULT_EPSILON)
    }

    /// Create with a custom epsilon for `normalize`.
    pub fn with_epsilon(dim: usize, epsilon: f64) -> Self {
        Self {
            mean: vec![0.0; dim],
            var: vec![1.0; dim],
            count: 0,
            epsilon,
        }
    }

    /// Restore statistics from persisted parts.
    pub fn from_parts(mean: Vec<f64>, var: Vec<f64>, count: u64) -> Result<Self, StatsError> {
        if mean.len() != var.len() {
            return Err(StatsError::ShapeMismatch {
                mean: mean.len(),
                var: var.len(),
            });
        }
        if let Some((index, &value)) = var
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(StatsError::InvalidVariance { index, value });
        }
        Ok(Self {
            mean,
            var,
            count,
            epsilon: DEFAULT_EPSILON,
        })
    }

    /// Merge a row-major batch of `N * dim` values.
    ///
    /// # Panics
    /// Panics if the batch length is not a multiple of `dim`.
    pub fn update(&mut self, batch: &[f64]) {
        let dim = self.dim();
        if dim == 0 || batch.is_empty() {
            return;
        }
        assert_eq!(batch.len() % dim, 0, "batch length must be a multiple of dim");
        let n = batch.len() / dim;

        let mut batch_mean = vec![0.0f64; dim];
        for row in batch.chunks_exact(dim) {
            for (m, &x) in batch_mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in batch_mean.iter_mut() {
            *m /= n as f64;
        }

        let mut batch_var = vec![0.0f64; dim];
        for row in batch.chunks_exact(dim) {
            for ((v, &x), &m) in batch_var.iter_mut().zip(row).zip(&batch_mean) {
                *v += (x - m) * (x - m);
            }
        }
        for v in batch_var.iter_mut() {
            *v /= n as f64;
        }

        self.merge_moments(&batch_mean, &batch_var, n as u64);
    }

    /// Merge a single sample.
    pub fn update_one(&mut self, sample: &[f64]) {
        assert_eq!(sample.len(), self.dim(), "sample dimension mismatch");
        self.update(sample);
    }

    /// Merge precomputed batch moments.
    pub fn merge_moments(&mut self, batch_mean: &[f64], batch_var: &[f64], batch_count: u64) {
        assert_eq!(batch_mean.len(), self.dim(), "batch mean dimension mismatch");
        assert_eq!(batch_var.len(), self.dim(), "batch var dimension mismatch");
        if batch_count == 0 {
            return;
        }

        let count = self.count as f64;
        let bc = batch_count as f64;
        let total = count + bc;

        for i in 0..self.mean.len() {
            let delta = batch_mean[i] - self.mean[i];
            let new_mean = self.mean[i] + delta * bc / total;
            let m2 = self.var[i] * count + batch_var[i] * bc + delta * delta * count * bc / total;
            self.mean[i] = new_mean;
            self.var[i] = m2 / total;
        }

        self.count += batch_count;
    }

    /// `(x - mean) / sqrt(var + epsilon)`. No clipping.
    pub fn normalize(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.dim(), "normalize dimension mismatch");
        x.iter()
            .zip(self.mean.iter().zip(&self.var))
            .map(|(&x, (&m, &v))| (x - m) / (v + self.epsilon).sqrt())
            .collect()
    }

    /// Standard deviation used by `normalize` for feature `i`.
    pub fn scale(&self, i: usize) -> f64 {
        (self.var[i] + self.epsilon).sqrt()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn var(&self) -> &[f64] {
        &self.var
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Replace the epsilon used by `normalize`. Persisted parts carry none.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    /// Reset to the initial state (mean 0, var 1, count 0).
    pub fn reset(&mut self) {
        self.mean.fill(0.0);
        self.var.fill(1.0);
        self.count = 0;
    }
}
