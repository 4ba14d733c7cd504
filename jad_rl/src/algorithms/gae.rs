//! Generalized Advantage Estimation over a rollout window.
//!
//! Backward recursion with an external bootstrap value `V(T)`:
//!
//! ```text
//! δ_t   = r_t + γ · V(t+1) · (1 − done_t) − V(t)
//! gae_t = δ_t + γ · λ · (1 − done_t) · gae_{t+1}
//! ret_t = gae_t + V(t)
//! ```
//!
//! A done flag at step t cuts both the bootstrap and the accumulated
//! advantage, so no credit crosses an episode boundary.

/// Advantages and returns for one rollout window.
#[derive(Debug, Clone, PartialEq)]
pub struct GaeOutput {
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

/// GAE for a single environment's trajectory.
///
/// `next_value` is `V(s_T)`, the estimate for the observation following the
/// last recorded step.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    next_value: f32,
    gamma: f32,
    gae_lambda: f32,
) -> GaeOutput {
    compute_gae_strided(rewards, values, dones, &[next_value], 1, gamma, gae_lambda)
}

/// GAE for `n_envs` environments stored interleaved (`t * n_envs + env`).
///
/// Each environment column is an independent recursion seeded with its own
/// entry of `next_values`.
///
/// # Panics
/// Panics if the slice lengths disagree or are not a multiple of `n_envs`.
pub fn compute_gae_vectorized(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    next_values: &[f32],
    n_envs: usize,
    gamma: f32,
    gae_lambda: f32,
) -> GaeOutput {
    compute_gae_strided(rewards, values, dones, next_values, n_envs, gamma, gae_lambda)
}

fn compute_gae_strided(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    next_values: &[f32],
    n_envs: usize,
    gamma: f32,
    gae_lambda: f32,
) -> GaeOutput {
    let total = rewards.len();
    assert!(n_envs > 0, "n_envs must be positive");
    assert_eq!(values.len(), total, "values length");
    assert_eq!(dones.len(), total, "dones length");
    assert_eq!(next_values.len(), n_envs, "one bootstrap value per environment");
    assert_eq!(total % n_envs, 0, "window length must be a multiple of n_envs");

    let steps = total / n_envs;
    let mut advantages = vec![0.0f32; total];
    let mut returns = vec![0.0f32; total];

    for env in 0..n_envs {
        let mut gae = 0.0f32;
        let mut next_value = next_values[env];
        for t in (0..steps).rev() {
            let i = t * n_envs + env;
            let live = if dones[i] { 0.0 } else { 1.0 };
            let delta = rewards[i] + gamma * next_value * live - values[i];
            gae = delta + gamma * gae_lambda * live * gae;
            advantages[i] = gae;
            returns[i] = gae + values[i];
            next_value = values[i];
        }
    }

    GaeOutput { advantages, returns }
}

/// Shift to zero mean and scale by the sample (n − 1) standard deviation.
///
/// `1e-8` is added to the standard deviation. Fewer than two entries are
/// only centred, since their sample deviation is undefined.
pub fn normalize_advantages(advantages: &mut [f32]) {
    let n = advantages.len();
    if n == 0 {
        return;
    }

    let mean = advantages.iter().map(|&a| a as f64).sum::<f64>() / n as f64;
    if n == 1 {
        advantages[0] = 0.0;
        return;
    }

    let var = advantages
        .iter()
        .map(|&a| (a as f64 - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    let std = var.sqrt() + 1e-8;

    for a in advantages.iter_mut() {
        *a = ((*a as f64 - mean) / std) as f32;
    }
}
