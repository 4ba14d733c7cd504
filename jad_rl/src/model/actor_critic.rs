//! Recurrent actor-critic with one categorical head per action dimension.
//!
//! ```text
//! obs ─► Linear ─► Tanh ─► Linear ─► Tanh ─► LSTM ─┬─► head_0 ─► logits_0
//!                                                  ├─► ...
//!                                                  ├─► head_k ─► logits_k
//!                                                  └─► value  ─► V(s)
//! ```
//!
//! The same network serves three callers: action selection during rollout
//! (single step, no gradient), bootstrap value prediction, and the
//! step-by-step replay used by the PPO update.

use burn::module::Module;
use burn::nn::Linear;
use burn::tensor::activation::tanh;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::algorithms::categorical::Categorical;
use crate::core::recurrent::{RecurrentState, StackedLstm, StackedLstmConfig};
use crate::nn::{OrthogonalLinearConfig, HIDDEN_GAIN, POLICY_GAIN, VALUE_GAIN};
use crate::runners::ppo_config::{check_count, ConfigError, PPOConfig};

/// Network shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub obs_dim: usize,
    /// Number of choices for each action head
    pub head_dims: Vec<usize>,
    pub trunk_width: usize,
    pub lstm_hidden: usize,
    pub lstm_layers: usize,
}

impl ModelConfig {
    pub fn new(obs_dim: usize, head_dims: Vec<usize>) -> Self {
        Self {
            obs_dim,
            head_dims,
            trunk_width: 64,
            lstm_hidden: 64,
            lstm_layers: 1,
        }
    }

    /// Take the layer sizes from a PPO configuration.
    pub fn from_ppo(obs_dim: usize, head_dims: Vec<usize>, ppo: &PPOConfig) -> Self {
        Self::new(obs_dim, head_dims)
            .with_trunk_width(ppo.trunk_width)
            .with_lstm_hidden(ppo.lstm_hidden)
            .with_lstm_layers(ppo.lstm_layers)
    }

    pub fn with_trunk_width(mut self, width: usize) -> Self {
        self.trunk_width = width;
        self
    }

    pub fn with_lstm_hidden(mut self, hidden: usize) -> Self {
        self.lstm_hidden = hidden;
        self
    }

    pub fn with_lstm_layers(mut self, layers: usize) -> Self {
        self.lstm_layers = layers;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("obs_dim", self.obs_dim)?;
        check_count("head_dims", self.head_dims.len())?;
        for &dim in &self.head_dims {
            check_count("head_dims[i]", dim)?;
        }
        check_count("trunk_width", self.trunk_width)?;
        check_count("lstm_hidden", self.lstm_hidden)?;
        check_count("lstm_layers", self.lstm_layers)?;
        Ok(())
    }

    /// Build the network with orthogonally initialized linear layers.
    pub fn init<B: Backend>(
        &self,
        rng: &mut fastrand::Rng,
        device: &B::Device,
    ) -> Result<RecurrentActorCritic<B>, ConfigError> {
        self.validate()?;

        let trunk_0 = OrthogonalLinearConfig::new(self.obs_dim, self.trunk_width)
            .with_gain(HIDDEN_GAIN)
            .init(rng, device);
        let trunk_1 = OrthogonalLinearConfig::new(self.trunk_width, self.trunk_width)
            .with_gain(HIDDEN_GAIN)
            .init(rng, device);
        let lstm = StackedLstmConfig::new(self.trunk_width, self.lstm_hidden)
            .with_layers(self.lstm_layers)
            .init(rng, device);
        let heads = self
            .head_dims
            .iter()
            .map(|&dim| {
                OrthogonalLinearConfig::new(self.lstm_hidden, dim)
                    .with_gain(POLICY_GAIN)
                    .init(rng, device)
            })
            .collect();
        let value_head = OrthogonalLinearConfig::new(self.lstm_hidden, 1)
            .with_gain(VALUE_GAIN)
            .init(rng, device);

        Ok(RecurrentActorCritic {
            trunk_0,
            trunk_1,
            lstm,
            heads,
            value_head,
            obs_dim: self.obs_dim,
        })
    }
}

/// Sequence forward output.
#[derive(Debug, Clone)]
pub struct SequenceOutput<B: Backend> {
    /// One `[batch, seq, dim_k]` tensor per head
    pub logits: Vec<Tensor<B, 3>>,
    /// `[batch, seq]`
    pub values: Tensor<B, 2>,
    pub state: RecurrentState<B>,
}

/// Single-step forward output.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    /// One `[batch, dim_k]` tensor per head
    pub logits: Vec<Tensor<B, 2>>,
    /// `[batch]`
    pub values: Tensor<B, 1>,
    pub state: RecurrentState<B>,
}

/// Result of [`RecurrentActorCritic::get_action`].
#[derive(Debug, Clone)]
pub struct ActionOutput<B: Backend> {
    /// `[batch][n_heads]`
    pub actions: Vec<Vec<u32>>,
    /// Joint log-probability (sum over heads) per row
    pub log_probs: Vec<f32>,
    pub values: Vec<f32>,
    pub state: RecurrentState<B>,
}

/// Result of [`RecurrentActorCritic::evaluate_actions`], flattened step-major
/// (`t * batch + env`).
#[derive(Debug, Clone)]
pub struct ActionEvaluation<B: Backend> {
    pub log_probs: Tensor<B, 1>,
    pub values: Tensor<B, 1>,
    pub entropy: Tensor<B, 1>,
}

/// Tanh trunk, stacked LSTM, categorical heads and a value head.
#[derive(Module, Debug)]
pub struct RecurrentActorCritic<B: Backend> {
    trunk_0: Linear<B>,
    trunk_1: Linear<B>,
    lstm: StackedLstm<B>,
    heads: Vec<Linear<B>>,
    value_head: Linear<B>,
    obs_dim: usize,
}

impl<B: Backend> RecurrentActorCritic<B> {
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn n_heads(&self) -> usize {
        self.heads.len()
    }

    /// Number of choices per head.
    pub fn head_dims(&self) -> Vec<usize> {
        self.heads.iter().map(|h| h.weight.val().dims()[1]).collect()
    }

    pub fn lstm_layers(&self) -> usize {
        self.lstm.n_layers()
    }

    pub fn lstm_hidden(&self) -> usize {
        self.lstm.hidden_size()
    }

    /// Zero recurrent state for `batch` rows.
    pub fn initial_state(&self, batch: usize, device: &B::Device) -> RecurrentState<B> {
        self.lstm.initial_state(batch, device)
    }

    fn trunk<const D: usize>(&self, obs: Tensor<B, D>) -> Tensor<B, D> {
        let x = tanh(self.trunk_0.forward(obs));
        tanh(self.trunk_1.forward(x))
    }

    /// Run a `[batch, seq, obs]` sequence without any state resets.
    pub fn forward(
        &self,
        obs: Tensor<B, 3>,
        state: Option<RecurrentState<B>>,
    ) -> SequenceOutput<B> {
        let [batch, seq, _] = obs.dims();
        let state = state.unwrap_or_else(|| self.initial_state(batch, &obs.device()));

        let (features, state) = self.lstm.forward(self.trunk(obs), state);
        let logits = self.heads.iter().map(|h| h.forward(features.clone())).collect();
        let values = self.value_head.forward(features).reshape([batch, seq]);

        SequenceOutput {
            logits,
            values,
            state,
        }
    }

    /// Single-timestep form of [`forward`](Self::forward) for `[batch, obs]`.
    pub fn forward_step(
        &self,
        obs: Tensor<B, 2>,
        state: Option<RecurrentState<B>>,
    ) -> StepOutput<B> {
        let [batch, obs_dim] = obs.dims();
        let out = self.forward(obs.reshape([batch, 1, obs_dim]), state);

        StepOutput {
            logits: out
                .logits
                .into_iter()
                .map(|l| {
                    let dim = l.dims()[2];
                    l.reshape([batch, dim])
                })
                .collect(),
            values: out.values.reshape([batch]),
            state: out.state,
        }
    }

    /// Choose one action per head for every row.
    ///
    /// Intended for the inference backend; nothing here records gradients.
    pub fn get_action(
        &self,
        obs: Tensor<B, 2>,
        state: Option<RecurrentState<B>>,
        deterministic: bool,
        rng: &mut fastrand::Rng,
    ) -> ActionOutput<B> {
        let batch = obs.dims()[0];
        let out = self.forward_step(obs, state);

        let mut actions = vec![Vec::with_capacity(self.n_heads()); batch];
        let mut log_probs = vec![0.0f32; batch];
        for logits in out.logits {
            let dist = Categorical::new(logits);
            let chosen = if deterministic {
                dist.mode()
            } else {
                dist.sample(rng)
            };
            let lp: Vec<f32> = dist.log_prob(&chosen).into_data().iter::<f32>().collect();
            for (row, (&a, l)) in chosen.iter().zip(lp).enumerate() {
                actions[row].push(a);
                log_probs[row] += l;
            }
        }

        ActionOutput {
            actions,
            log_probs,
            values: out.values.into_data().iter::<f32>().collect(),
            state: out.state,
        }
    }

    /// Per-step top-layer LSTM outputs of a replay, each `[batch, hidden]`.
    ///
    /// After step t, rows whose `dones[t]` is set restart from a zero state.
    pub fn replay_features(
        &self,
        obs: Tensor<B, 3>,
        dones: &[Vec<bool>],
        initial: Option<RecurrentState<B>>,
    ) -> Vec<Tensor<B, 2>> {
        let [batch, steps, _] = obs.dims();
        assert_eq!(dones.len(), steps, "one done row per step");
        let width = self.trunk_0.weight.val().dims()[1];
        let hidden = self.lstm.hidden_size();

        let encoded = self.trunk(obs);
        let mut state = initial.unwrap_or_else(|| self.initial_state(batch, &encoded.device()));
        let mut features = Vec::with_capacity(steps);

        for (t, done_row) in dones.iter().enumerate() {
            let x = encoded.clone().slice([0..batch, t..t + 1, 0..width]);
            let (out, next) = self.lstm.forward(x, state);
            features.push(out.reshape([batch, hidden]));
            state = next.reset_where(done_row);
        }

        features
    }

    /// Replay a stored window one step at a time and score the stored actions.
    ///
    /// `obs` is `[batch, T, obs_dim]`; `actions` is laid out
    /// `(t * batch + env) * n_heads + head`; `dones` is `[T][batch]`.
    pub fn evaluate_actions(
        &self,
        obs: Tensor<B, 3>,
        actions: &[u32],
        dones: &[Vec<bool>],
        initial: Option<RecurrentState<B>>,
    ) -> ActionEvaluation<B> {
        let [batch, steps, _] = obs.dims();
        let k = self.n_heads();
        assert_eq!(actions.len(), steps * batch * k, "actions must cover every step and head");

        let features = self.replay_features(obs, dones, initial);

        let mut log_probs = Vec::with_capacity(steps);
        let mut values = Vec::with_capacity(steps);
        let mut entropy = Vec::with_capacity(steps);

        for (t, feat) in features.into_iter().enumerate() {
            let step_actions = &actions[t * batch * k..(t + 1) * batch * k];
            let mut lp_sum: Option<Tensor<B, 1>> = None;
            let mut ent_sum: Option<Tensor<B, 1>> = None;

            for (h, head) in self.heads.iter().enumerate() {
                let dist = Categorical::new(head.forward(feat.clone()));
                let chosen: Vec<u32> = step_actions.iter().skip(h).step_by(k).copied().collect();
                let lp = dist.log_prob(&chosen);
                let ent = dist.entropy();
                lp_sum = Some(match lp_sum {
                    Some(acc) => acc + lp,
                    None => lp,
                });
                ent_sum = Some(match ent_sum {
                    Some(acc) => acc + ent,
                    None => ent,
                });
            }

            // at least one head is guaranteed by ModelConfig::validate
            if let (Some(lp), Some(ent)) = (lp_sum, ent_sum) {
                log_probs.push(lp);
                entropy.push(ent);
            }
            values.push(self.value_head.forward(feat).reshape([batch]));
        }

        ActionEvaluation {
            log_probs: Tensor::cat(log_probs, 0),
            values: Tensor::cat(values, 0),
            entropy: Tensor::cat(entropy, 0),
        }
    }
}
