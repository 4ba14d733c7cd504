//! Tests for Generalized Advantage Estimation.
//!
//! Cover the recursion at its λ and γ extremes, done handling, the
//! interleaved multi-environment layout and advantage normalization.

use crate::algorithms::gae::{compute_gae, compute_gae_vectorized, normalize_advantages};

fn assert_all_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < tol, "index {}: expected {}, got {}", i, e, a);
    }
}

// ============================================================================
// Recursion extremes
// ============================================================================

/// λ = 1 with no dones gives Monte Carlo returns minus values.
#[test]
fn test_lambda_one_is_monte_carlo() {
    let rewards = [1.0, 2.0, 3.0];
    let values = [0.5, -0.5, 1.0];
    let dones = [false, false, false];
    let gamma = 0.9;
    let next_value = 2.0;

    let out = compute_gae(&rewards, &values, &dones, next_value, gamma, 1.0);

    let g2 = 3.0 + gamma * next_value;
    let g1 = 2.0 + gamma * g2;
    let g0 = 1.0 + gamma * g1;
    assert_all_close(&out.returns, &[g0, g1, g2], 1e-5);
    assert_all_close(&out.advantages, &[g0 - 0.5, g1 + 0.5, g2 - 1.0], 1e-5);
}

/// γ = 0 reduces every advantage to `r_t − V_t`.
#[test]
fn test_gamma_zero_is_immediate_td() {
    let rewards = [1.0, -2.0, 0.5, 4.0];
    let values = [0.3, 0.1, -1.0, 2.0];
    let dones = [false, true, false, false];

    let out = compute_gae(&rewards, &values, &dones, 100.0, 0.0, 0.95);

    let expected: Vec<f32> = rewards.iter().zip(&values).map(|(r, v)| r - v).collect();
    assert_all_close(&out.advantages, &expected, 1e-6);
}

/// λ = 0 gives one-step TD errors with the bootstrap at the end.
#[test]
fn test_lambda_zero_is_one_step_td() {
    let rewards = [1.0, 2.0, 3.0];
    let values = [0.5, 0.8, 1.0];
    let dones = [false, false, false];
    let gamma = 0.99;

    let out = compute_gae(&rewards, &values, &dones, 1.2, gamma, 0.0);

    assert_all_close(
        &out.advantages,
        &[
            1.0 + gamma * 0.8 - 0.5,
            2.0 + gamma * 1.0 - 0.8,
            3.0 + gamma * 1.2 - 1.0,
        ],
        1e-5,
    );
}

// ============================================================================
// Episode boundaries
// ============================================================================

/// Final-step reward with zero values: returns are plain discounted sums.
#[test]
fn test_terminal_reward_discounted_sums() {
    let rewards = [1.0, 1.0, 1.0, 1.0, 10.0];
    let values = [0.0; 5];
    let dones = [false, false, false, false, true];
    let gamma = 0.99f32;

    let out = compute_gae(&rewards, &values, &dones, 123.0, gamma, 1.0);

    let mut expected = [0.0f32; 5];
    let mut acc = 0.0;
    for t in (0..5).rev() {
        acc = rewards[t] + gamma * acc;
        expected[t] = acc;
    }
    assert_all_close(&out.returns, &expected, 1e-4);
}

/// Default γ and λ with zero values and no bootstrap: returns are
/// (γλ)-discounted sums of the rewards.
#[test]
fn test_default_coefficients_terminal_window() {
    let rewards = [1.0, 1.0, 1.0, 1.0, 10.0];
    let values = [0.0; 5];
    let dones = [false, false, false, false, true];

    let out = compute_gae(&rewards, &values, &dones, 0.0, 0.99, 0.95);

    // 10, 1 + 0.9405 * 10, 1 + 0.9405 * 10.405, ...
    let expected = [11.481066, 11.144142, 10.785903, 10.405001, 10.0];
    assert_all_close(&out.returns, &expected, 1e-4);
    assert_all_close(&out.advantages, &expected, 1e-4);
}

/// A done in the middle stops credit from flowing backward across it.
#[test]
fn test_done_blocks_propagation() {
    let rewards = [0.0, 0.0, 0.0, 100.0];
    let values = [0.0; 4];
    let dones = [false, true, false, false];

    let out = compute_gae(&rewards, &values, &dones, 0.0, 0.99, 0.95);

    assert_eq!(out.advantages[0], 0.0);
    assert_eq!(out.advantages[1], 0.0);
    assert!(out.advantages[2] > 0.0);
}

/// `returns = advantages + values` for every entry.
#[test]
fn test_returns_identity() {
    let mut rng = fastrand::Rng::with_seed(5);
    let n = 64;
    let rewards: Vec<f32> = (0..n).map(|_| rng.f32() * 2.0 - 1.0).collect();
    let values: Vec<f32> = (0..n).map(|_| rng.f32()).collect();
    let dones: Vec<bool> = (0..n).map(|_| rng.u8(0..10) == 0).collect();

    let out = compute_gae(&rewards, &values, &dones, 0.3, 0.99, 0.95);
    for t in 0..n {
        assert!((out.returns[t] - (out.advantages[t] + values[t])).abs() < 1e-5);
    }
}

// ============================================================================
// Interleaved layout
// ============================================================================

/// Each column of the interleaved layout matches a standalone computation.
#[test]
fn test_vectorized_matches_per_env() {
    let n_envs = 3;
    let steps = 4;
    let mut rng = fastrand::Rng::with_seed(9);
    let rewards: Vec<f32> = (0..n_envs * steps).map(|_| rng.f32()).collect();
    let values: Vec<f32> = (0..n_envs * steps).map(|_| rng.f32()).collect();
    let dones: Vec<bool> = (0..n_envs * steps).map(|i| i == 4 || i == 9).collect();
    let next_values = [0.1, 0.2, 0.3];

    let out = compute_gae_vectorized(&rewards, &values, &dones, &next_values, n_envs, 0.99, 0.95);

    for env in 0..n_envs {
        let column = |xs: &[f32]| -> Vec<f32> { (0..steps).map(|t| xs[t * n_envs + env]).collect() };
        let env_dones: Vec<bool> = (0..steps).map(|t| dones[t * n_envs + env]).collect();
        let single = compute_gae(
            &column(&rewards),
            &column(&values),
            &env_dones,
            next_values[env],
            0.99,
            0.95,
        );
        assert_all_close(&column(&out.advantages), &single.advantages, 1e-6);
        assert_all_close(&column(&out.returns), &single.returns, 1e-6);
    }
}

#[test]
#[should_panic(expected = "one bootstrap value per environment")]
fn test_vectorized_requires_bootstrap_per_env() {
    compute_gae_vectorized(&[0.0; 4], &[0.0; 4], &[false; 4], &[0.0], 2, 0.99, 0.95);
}

// ============================================================================
// Advantage normalization
// ============================================================================

/// Zero mean and unit sample standard deviation.
#[test]
fn test_normalize_uses_sample_std() {
    let mut adv = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    normalize_advantages(&mut adv);

    let n = adv.len() as f32;
    let mean = adv.iter().sum::<f32>() / n;
    let sample_var = adv.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / (n - 1.0);
    assert!(mean.abs() < 1e-6);
    assert!((sample_var.sqrt() - 1.0).abs() < 1e-5);
    // population std of 1..5 is sqrt(2); the sample std is sqrt(2.5)
    assert!((adv[4] - 2.0 / 2.5f32.sqrt()).abs() < 1e-5);
}

#[test]
fn test_normalize_constant_values_is_finite() {
    let mut adv = vec![3.0; 6];
    normalize_advantages(&mut adv);
    assert!(adv.iter().all(|a| a.is_finite() && a.abs() < 1e-3));
}

#[test]
fn test_normalize_degenerate_lengths() {
    let mut empty: Vec<f32> = vec![];
    normalize_advantages(&mut empty);
    assert!(empty.is_empty());

    let mut single = vec![7.0];
    normalize_advantages(&mut single);
    assert_eq!(single, vec![0.0]);
}
