//! Rollout buffer for recurrent PPO.
//!
//! Key characteristics:
//! - Fixed window of `rollout_len` vectorized steps over `n_envs` environments
//! - Interleaved layout: index `t * n_envs + env` for every per-env field
//! - Holds one recurrent-state snapshot captured at the first step of the window
//! - Cleared (including the snapshot) after each update

use burn::tensor::backend::Backend;

use crate::core::recurrent::RecurrentState;

/// Configuration for rollout buffer.
#[derive(Debug, Clone)]
pub struct RolloutBufferConfig {
    /// Number of parallel environments
    pub n_envs: usize,
    /// Steps per rollout per environment
    pub rollout_len: usize,
    /// Observation vector length
    pub obs_dim: usize,
    /// Number of action heads
    pub n_heads: usize,
}

impl RolloutBufferConfig {
    pub fn new(n_envs: usize, rollout_len: usize, obs_dim: usize, n_heads: usize) -> Self {
        Self {
            n_envs,
            rollout_len,
            obs_dim,
            n_heads,
        }
    }
}

/// One vectorized step: a row per environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutStep {
    /// `[n_envs * obs_dim]`
    pub observations: Vec<f32>,
    /// `[n_envs * n_heads]`
    pub actions: Vec<u32>,
    pub log_probs: Vec<f32>,
    pub values: Vec<f32>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
}

/// Window of recorded steps plus the recurrent state it started from.
#[derive(Debug)]
pub struct RolloutBuffer<B: Backend> {
    config: RolloutBufferConfig,
    observations: Vec<f32>,
    actions: Vec<u32>,
    log_probs: Vec<f32>,
    values: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    initial_state: Option<RecurrentState<B>>,
    step_count: usize,
}

impl<B: Backend> RolloutBuffer<B> {
    pub fn new(config: RolloutBufferConfig) -> Self {
        let capacity = config.n_envs * config.rollout_len;
        Self {
            observations: Vec::with_capacity(capacity * config.obs_dim),
            actions: Vec::with_capacity(capacity * config.n_heads),
            log_probs: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            initial_state: None,
            step_count: 0,
            config,
        }
    }

    pub fn config(&self) -> &RolloutBufferConfig {
        &self.config
    }

    /// Record the state the window starts from.
    pub fn set_initial_state(&mut self, state: RecurrentState<B>) {
        self.initial_state = Some(state);
    }

    pub fn initial_state(&self) -> Option<&RecurrentState<B>> {
        self.initial_state.as_ref()
    }

    /// Append one vectorized step.
    ///
    /// # Panics
    /// Panics if the buffer is full or a field has the wrong length.
    pub fn push_step(&mut self, step: RolloutStep) {
        let n = self.config.n_envs;
        assert!(!self.is_full(), "rollout buffer is full");
        assert_eq!(step.observations.len(), n * self.config.obs_dim, "observation row size");
        assert_eq!(step.actions.len(), n * self.config.n_heads, "action row size");
        assert_eq!(step.log_probs.len(), n, "log_probs length");
        assert_eq!(step.values.len(), n, "values length");
        assert_eq!(step.rewards.len(), n, "rewards length");
        assert_eq!(step.dones.len(), n, "dones length");

        self.observations.extend(step.observations);
        self.actions.extend(step.actions);
        self.log_probs.extend(step.log_probs);
        self.values.extend(step.values);
        self.rewards.extend(step.rewards);
        self.dones.extend(step.dones);
        self.step_count += 1;
    }

    /// Number of vectorized steps recorded.
    pub fn len(&self) -> usize {
        self.step_count
    }

    pub fn is_empty(&self) -> bool {
        self.step_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.step_count >= self.config.rollout_len
    }

    pub fn observations(&self) -> &[f32] {
        &self.observations
    }

    pub fn actions(&self) -> &[u32] {
        &self.actions
    }

    pub fn log_probs(&self) -> &[f32] {
        &self.log_probs
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn dones(&self) -> &[bool] {
        &self.dones
    }

    /// Done flags grouped per step: `[t][env]`.
    pub fn dones_per_step(&self) -> Vec<Vec<bool>> {
        self.dones
            .chunks(self.config.n_envs)
            .map(|row| row.to_vec())
            .collect()
    }

    /// Observations reordered env-major: `[env][t][obs]`, flattened.
    pub fn observations_env_major(&self) -> Vec<f32> {
        let (n, t_len, d) = (self.config.n_envs, self.step_count, self.config.obs_dim);
        let mut out = Vec::with_capacity(self.observations.len());
        for env in 0..n {
            for t in 0..t_len {
                let start = (t * n + env) * d;
                out.extend_from_slice(&self.observations[start..start + d]);
            }
        }
        out
    }

    /// Drop every step and the cached initial state.
    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.log_probs.clear();
        self.values.clear();
        self.rewards.clear();
        self.dones.clear();
        self.initial_state = None;
        self.step_count = 0;
    }
}
