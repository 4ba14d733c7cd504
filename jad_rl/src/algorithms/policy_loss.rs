//! PPO loss terms.
//!
//! Tensor versions carry gradients through the update; the slice versions
//! compute the same quantities for diagnostics and tests.

use burn::tensor::{backend::Backend, Tensor};

/// PPO clipped surrogate loss.
///
/// `ratio = exp(log_probs − old_log_probs)`;
/// `loss = −mean(min(ratio · A, clip(ratio, 1−ε, 1+ε) · A))`.
pub fn ppo_clip_loss<B: Backend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_ratio: f32,
) -> Tensor<B, 1> {
    let ratio = (log_probs - old_log_probs).exp();
    let clipped = ratio.clone().clamp(1.0 - clip_ratio, 1.0 + clip_ratio);

    let surr1 = ratio * advantages.clone();
    let surr2 = clipped * advantages;

    -surr1.min_pair(surr2).mean()
}

/// Mean squared error between predicted values and GAE returns.
pub fn value_loss<B: Backend>(values: Tensor<B, 1>, returns: Tensor<B, 1>) -> Tensor<B, 1> {
    (values - returns).powf_scalar(2.0).mean()
}

/// Negative mean entropy. Adding it with a positive coefficient rewards exploration.
pub fn entropy_loss<B: Backend>(entropy: Tensor<B, 1>) -> Tensor<B, 1> {
    -entropy.mean()
}

/// `policy + vf_coef · value + entropy_coef · entropy_loss`.
pub fn combined_loss<B: Backend>(
    policy_loss: Tensor<B, 1>,
    value_loss: Tensor<B, 1>,
    entropy_loss: Tensor<B, 1>,
    vf_coef: f32,
    entropy_coef: f32,
) -> Tensor<B, 1> {
    policy_loss + value_loss.mul_scalar(vf_coef) + entropy_loss.mul_scalar(entropy_coef)
}

/// Scalar form of [`ppo_clip_loss`].
pub fn ppo_clip_loss_scalar(
    log_probs: &[f32],
    old_log_probs: &[f32],
    advantages: &[f32],
    clip_ratio: f32,
) -> f32 {
    let n = log_probs.len();
    assert_eq!(old_log_probs.len(), n);
    assert_eq!(advantages.len(), n);
    if n == 0 {
        return 0.0;
    }

    let total: f32 = log_probs
        .iter()
        .zip(old_log_probs)
        .zip(advantages)
        .map(|((&lp, &old), &adv)| {
            let ratio = (lp - old).exp();
            let clipped = ratio.clamp(1.0 - clip_ratio, 1.0 + clip_ratio);
            (ratio * adv).min(clipped * adv)
        })
        .sum();

    -total / n as f32
}

/// Scalar form of [`value_loss`].
pub fn value_loss_scalar(values: &[f32], returns: &[f32]) -> f32 {
    let n = values.len();
    assert_eq!(returns.len(), n);
    if n == 0 {
        return 0.0;
    }
    values
        .iter()
        .zip(returns)
        .map(|(v, r)| (v - r).powi(2))
        .sum::<f32>()
        / n as f32
}

/// Approximate KL divergence `mean((ratio − 1) − log ratio)`.
pub fn approx_kl(log_probs: &[f32], old_log_probs: &[f32]) -> f32 {
    let n = log_probs.len();
    assert_eq!(old_log_probs.len(), n);
    if n == 0 {
        return 0.0;
    }
    log_probs
        .iter()
        .zip(old_log_probs)
        .map(|(&lp, &old)| {
            let log_ratio = lp - old;
            log_ratio.exp() - 1.0 - log_ratio
        })
        .sum::<f32>()
        / n as f32
}

/// Fraction of samples whose ratio left `[1 − ε, 1 + ε]`.
pub fn clip_fraction(log_probs: &[f32], old_log_probs: &[f32], clip_ratio: f32) -> f32 {
    let n = log_probs.len();
    assert_eq!(old_log_probs.len(), n);
    if n == 0 {
        return 0.0;
    }
    let clipped = log_probs
        .iter()
        .zip(old_log_probs)
        .filter(|(&lp, &old)| ((lp - old).exp() - 1.0).abs() > clip_ratio)
        .count();
    clipped as f32 / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_loss_caps_positive_advantage() {
        // ratio 1.5 with advantage 2 and ε = 0.2: min(3.0, 2.4) = 2.4
        let old = vec![0.0];
        let new = vec![1.5f32.ln()];
        let loss = ppo_clip_loss_scalar(&new, &old, &[2.0], 0.2);
        assert!((loss + 2.4).abs() < 1e-5, "got {}", loss);
    }

    #[test]
    fn test_clip_loss_pessimistic_for_negative_advantage() {
        // ratio 0.5 with advantage -1: min(-0.5, -0.8) = -0.8
        let loss = ppo_clip_loss_scalar(&[0.5f32.ln()], &[0.0], &[-1.0], 0.2);
        assert!((loss - 0.8).abs() < 1e-5, "got {}", loss);
    }

    #[test]
    fn test_value_loss_scalar_mse() {
        let loss = value_loss_scalar(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((loss - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_approx_kl_zero_on_policy() {
        assert_eq!(approx_kl(&[-0.3, -1.2], &[-0.3, -1.2]), 0.0);
        assert!(approx_kl(&[-0.1], &[-0.9]) > 0.0);
    }

    #[test]
    fn test_clip_fraction_counts_out_of_range() {
        let old = [0.0, 0.0, 0.0, 0.0];
        let new = [0.0, 1.1f32.ln(), 1.5f32.ln(), 0.5f32.ln()];
        assert!((clip_fraction(&new, &old, 0.2) - 0.5).abs() < 1e-6);
    }
}
