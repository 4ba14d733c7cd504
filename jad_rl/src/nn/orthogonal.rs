//! Orthogonal initialization for linear layers.
//!
//! Weights are drawn from a standard normal, orthonormalized with
//! Gram-Schmidt and scaled by a gain. Hidden layers use `sqrt(2)`, policy
//! heads `0.01` (near-uniform initial policy) and the value head `1.0`.
//!
//! The matrix is built on the host from a seeded `fastrand::Rng`, so two
//! models built from the same seed start with identical weights.

use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor, TensorData};

/// Gain for Tanh hidden layers.
pub const HIDDEN_GAIN: f64 = std::f64::consts::SQRT_2;
/// Gain for policy heads.
pub const POLICY_GAIN: f64 = 0.01;
/// Gain for the value head.
pub const VALUE_GAIN: f64 = 1.0;

/// Configuration for an orthogonally initialized [`Linear`].
#[derive(Debug, Clone)]
pub struct OrthogonalLinearConfig {
    pub d_input: usize,
    pub d_output: usize,
    pub gain: f64,
}

impl OrthogonalLinearConfig {
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            gain: 1.0,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Build a burn `Linear` with orthogonal weights and zero bias.
    pub fn init<B: Backend>(&self, rng: &mut fastrand::Rng, device: &B::Device) -> Linear<B> {
        let mut linear = LinearConfig::new(self.d_input, self.d_output).init(device);

        // Linear stores its weight as [d_input, d_output]
        let values = orthogonal_matrix(self.d_input, self.d_output, self.gain, rng);
        let weight = Tensor::from_data(
            TensorData::new(values, [self.d_input, self.d_output]),
            device,
        );
        linear.weight = Param::from_tensor(weight);
        linear.bias = Some(Param::from_tensor(Tensor::zeros([self.d_output], device)));
        linear
    }
}

/// Row-major `rows × cols` matrix with orthonormal columns (tall) or rows
/// (wide), scaled by `gain`.
pub fn orthogonal_matrix(rows: usize, cols: usize, gain: f64, rng: &mut fastrand::Rng) -> Vec<f32> {
    // Orthonormalize the shorter side's vectors, each of length `long`.
    let (short, long) = if rows >= cols { (cols, rows) } else { (rows, cols) };
    let mut vectors: Vec<Vec<f64>> = Vec::with_capacity(short);

    while vectors.len() < short {
        let mut v: Vec<f64> = (0..long).map(|_| standard_normal(rng)).collect();
        for u in &vectors {
            let dot: f64 = v.iter().zip(u).map(|(a, b)| a * b).sum();
            for (x, y) in v.iter_mut().zip(u) {
                *x -= dot * y;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        // linearly dependent draw; try again
        if norm < 1e-10 {
            continue;
        }
        v.iter_mut().for_each(|x| *x /= norm);
        vectors.push(v);
    }

    let mut out = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            let x = if rows >= cols { vectors[c][r] } else { vectors[r][c] };
            out[r * cols + c] = (x * gain) as f32;
        }
    }
    out
}

/// Box-Muller transform over two uniform draws.
fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn gram(m: &[f32], rows: usize, cols: usize, by_columns: bool) -> Vec<f64> {
        let n = if by_columns { cols } else { rows };
        let mut g = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let len = if by_columns { rows } else { cols };
                g[i * n + j] = (0..len)
                    .map(|k| {
                        let (a, b) = if by_columns {
                            (m[k * cols + i], m[k * cols + j])
                        } else {
                            (m[i * cols + k], m[j * cols + k])
                        };
                        a as f64 * b as f64
                    })
                    .sum();
            }
        }
        g
    }

    fn assert_identity(g: &[f64], n: usize, scale: f64) {
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { scale } else { 0.0 };
                assert!((g[i * n + j] - expected).abs() < 1e-4, "entry ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_tall_matrix_has_orthonormal_columns() {
        let mut rng = fastrand::Rng::with_seed(1);
        let m = orthogonal_matrix(8, 4, 1.0, &mut rng);
        assert_identity(&gram(&m, 8, 4, true), 4, 1.0);
    }

    #[test]
    fn test_wide_matrix_has_orthonormal_rows() {
        let mut rng = fastrand::Rng::with_seed(2);
        let m = orthogonal_matrix(3, 10, 2.0, &mut rng);
        assert_identity(&gram(&m, 3, 10, false), 3, 4.0);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = orthogonal_matrix(5, 5, 1.0, &mut fastrand::Rng::with_seed(9));
        let b = orthogonal_matrix(5, 5, 1.0, &mut fastrand::Rng::with_seed(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_linear_forward_shape_and_zero_bias() {
        let device = Default::default();
        let mut rng = fastrand::Rng::with_seed(3);
        let linear = OrthogonalLinearConfig::new(4, 3)
            .with_gain(POLICY_GAIN)
            .init::<B>(&mut rng, &device);

        let out = linear.forward(Tensor::<B, 2>::zeros([2, 4], &device));
        assert_eq!(out.dims(), [2, 3]);
        let values: Vec<f32> = out.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|&x| x == 0.0));
    }
}
