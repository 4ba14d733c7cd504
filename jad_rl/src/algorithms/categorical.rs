//! Categorical distribution over one action head.

use burn::tensor::activation::{log_softmax, softmax};
use burn::tensor::{backend::Backend, Int, Tensor};

/// Categorical distribution parameterized by logits `[batch, n_actions]`.
#[derive(Debug, Clone)]
pub struct Categorical<B: Backend> {
    logits: Tensor<B, 2>,
}

impl<B: Backend> Categorical<B> {
    pub fn new(logits: Tensor<B, 2>) -> Self {
        Self { logits }
    }

    pub fn batch_size(&self) -> usize {
        self.logits.dims()[0]
    }

    pub fn n_actions(&self) -> usize {
        self.logits.dims()[1]
    }

    pub fn probs(&self) -> Tensor<B, 2> {
        softmax(self.logits.clone(), 1)
    }

    pub fn log_probs(&self) -> Tensor<B, 2> {
        log_softmax(self.logits.clone(), 1)
    }

    /// Draw one action per row by inverting the cumulative distribution.
    pub fn sample(&self, rng: &mut fastrand::Rng) -> Vec<u32> {
        let n_actions = self.n_actions();
        let probs: Vec<f32> = self.probs().into_data().iter::<f32>().collect();

        probs
            .chunks_exact(n_actions)
            .map(|row| {
                let u = rng.f32();
                let mut cumsum = 0.0;
                for (a, &p) in row.iter().enumerate() {
                    cumsum += p;
                    // rounding can leave the total just under 1
                    if u < cumsum || a == n_actions - 1 {
                        return a as u32;
                    }
                }
                (n_actions - 1) as u32
            })
            .collect()
    }

    /// Most likely action per row. Ties go to the lowest index.
    pub fn mode(&self) -> Vec<u32> {
        let n_actions = self.n_actions();
        let logits: Vec<f32> = self.logits.clone().into_data().iter::<f32>().collect();

        logits
            .chunks_exact(n_actions)
            .map(|row| {
                let mut best = 0;
                for (a, &x) in row.iter().enumerate() {
                    if x > row[best] {
                        best = a;
                    }
                }
                best as u32
            })
            .collect()
    }

    /// `log π(a)` for one action per row: `[batch]`.
    pub fn log_prob(&self, actions: &[u32]) -> Tensor<B, 1> {
        let batch = self.batch_size();
        assert_eq!(actions.len(), batch, "one action per row");
        let device = self.logits.device();

        let indices: Vec<i32> = actions.iter().map(|&a| a as i32).collect();
        let indices: Tensor<B, 2, Int> =
            Tensor::<B, 1, Int>::from_ints(indices.as_slice(), &device).reshape([batch, 1]);

        self.log_probs().gather(1, indices).reshape([batch])
    }

    /// `H = −Σ p · log p` per row: `[batch]`.
    pub fn entropy(&self) -> Tensor<B, 1> {
        let batch = self.batch_size();
        let log_p = self.log_probs();
        let p = log_p.clone().exp();
        -(p * log_p).sum_dim(1).reshape([batch])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray<f32>;

    fn dist(values: Vec<f32>, rows: usize, cols: usize) -> Categorical<B> {
        let device = Default::default();
        Categorical::new(Tensor::from_data(TensorData::new(values, [rows, cols]), &device))
    }

    #[test]
    fn test_uniform_entropy() {
        let d = dist(vec![0.0; 8], 2, 4);
        let h: Vec<f32> = d.entropy().into_data().iter::<f32>().collect();
        for x in h {
            assert!((x - 4.0f32.ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_log_prob_gathers_selected_action() {
        let d = dist(vec![0.0, 0.0, 2.0f32.ln(), 0.0], 2, 2);
        let lp: Vec<f32> = d.log_prob(&[1, 0]).into_data().iter::<f32>().collect();
        assert!((lp[0] - 0.5f32.ln()).abs() < 1e-5);
        assert!((lp[1] - (2.0f32 / 3.0).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_mode_picks_largest_logit() {
        let d = dist(vec![0.1, 3.0, -1.0, 5.0, 5.0, 0.0], 2, 3);
        assert_eq!(d.mode(), vec![1, 0]);
    }

    #[test]
    fn test_sample_follows_distribution() {
        // p = [0.1, 0.9]
        let d = dist(vec![0.0, 9.0f32.ln()], 1, 2);
        let mut rng = fastrand::Rng::with_seed(11);
        let ones = (0..2000).filter(|_| d.sample(&mut rng)[0] == 1).count();
        assert!((1700..1900).contains(&ones), "got {}", ones);
    }

    #[test]
    fn test_near_deterministic_sampling() {
        let d = dist(vec![-50.0, 50.0, -50.0], 1, 3);
        let mut rng = fastrand::Rng::with_seed(1);
        for _ in 0..50 {
            assert_eq!(d.sample(&mut rng), vec![1]);
        }
    }
}
