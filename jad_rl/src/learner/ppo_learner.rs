//! Recurrent PPO learner.
//!
//! Owns the model, its optimizer, the rollout buffer and the live recurrent
//! state used while acting. Acting runs on the inference backend
//! (`model.valid()`); the update replays the stored window on the autodiff
//! backend, always starting every epoch from the state recorded at the
//! beginning of the window.
//!
//! # Lifecycle per window
//!
//! ```text
//! store_initial_hidden ─► (select_action ─► store_transition) × rollout_len
//!                      ─► predict_values ─► update ─► buffer cleared
//! ```

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor, TensorData};

use crate::algorithms::gae::{compute_gae_vectorized, normalize_advantages, GaeOutput};
use crate::algorithms::grad_clip::{clip_grad_norm, global_grad_norm};
use crate::algorithms::policy_loss::{
    approx_kl, clip_fraction, combined_loss, entropy_loss, ppo_clip_loss, value_loss,
};
use crate::buffers::{RolloutBuffer, RolloutBufferConfig, RolloutStep};
use crate::core::recurrent::RecurrentState;
use crate::model::RecurrentActorCritic;
use crate::runners::ppo_config::PPOConfig;

type Inner<B> = <B as AutodiffBackend>::InnerBackend;

/// Adam with the epsilon used for PPO (gradient clipping is applied by the
/// learner on the global norm, not by the optimizer).
pub fn create_optimizer<B, M>() -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamConfig::new().with_epsilon(1e-8).init()
}

/// Actions chosen for one vectorized step.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSelection {
    /// `[n_envs][n_heads]`
    pub actions: Vec<Vec<u32>>,
    /// Joint log-probability per environment
    pub log_probs: Vec<f32>,
    pub values: Vec<f32>,
}

/// Averages over the epochs of one update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    /// Global gradient norm before clipping
    pub grad_norm: f32,
    pub approx_kl: f32,
    pub clip_fraction: f32,
}

/// Single-process recurrent PPO learner over `n_envs` parallel environments.
pub struct PPOLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<RecurrentActorCritic<B>, B>,
{
    model: RecurrentActorCritic<B>,
    optimizer: O,
    config: PPOConfig,
    n_envs: usize,
    device: B::Device,
    buffer: RolloutBuffer<Inner<B>>,
    live_state: RecurrentState<Inner<B>>,
    entropy_coef: f32,
    rng: fastrand::Rng,
}

impl<B, O> PPOLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<RecurrentActorCritic<B>, B>,
{
    pub fn new(
        model: RecurrentActorCritic<B>,
        optimizer: O,
        config: PPOConfig,
        n_envs: usize,
        device: B::Device,
    ) -> Self {
        assert!(n_envs > 0, "n_envs must be positive");
        let buffer = RolloutBuffer::new(RolloutBufferConfig::new(
            n_envs,
            config.rollout_len,
            model.obs_dim(),
            model.n_heads(),
        ));
        let live_state = RecurrentState::zeros(
            model.lstm_layers(),
            n_envs,
            model.lstm_hidden(),
            &device,
        );
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        Self {
            entropy_coef: config.entropy.initial(),
            model,
            optimizer,
            config,
            n_envs,
            device,
            buffer,
            live_state,
            rng,
        }
    }

    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    pub fn n_envs(&self) -> usize {
        self.n_envs
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn model(&self) -> &RecurrentActorCritic<B> {
        &self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn buffer(&self) -> &RolloutBuffer<Inner<B>> {
        &self.buffer
    }

    pub fn live_state(&self) -> &RecurrentState<Inner<B>> {
        &self.live_state
    }

    pub fn entropy_coef(&self) -> f32 {
        self.entropy_coef
    }

    /// Replace model and optimizer (checkpoint restore). The live state is zeroed.
    pub fn load(&mut self, model: RecurrentActorCritic<B>, optimizer: O) {
        self.model = model;
        self.optimizer = optimizer;
        self.reset_hidden();
    }

    fn obs_tensor(&self, obs: &[f32]) -> Tensor<Inner<B>, 2> {
        let dim = self.model.obs_dim();
        assert_eq!(obs.len(), self.n_envs * dim, "observation batch must be n_envs * obs_dim");
        Tensor::from_data(TensorData::new(obs.to_vec(), [self.n_envs, dim]), &self.device)
    }

    /// Pick actions for every environment and advance the live state.
    pub fn select_action(&mut self, obs: &[f32], deterministic: bool) -> ActionSelection {
        let obs = self.obs_tensor(obs);
        let out = self.model.valid().get_action(
            obs,
            Some(self.live_state.clone()),
            deterministic,
            &mut self.rng,
        );
        self.live_state = out.state;
        ActionSelection {
            actions: out.actions,
            log_probs: out.log_probs,
            values: out.values,
        }
    }

    /// Value estimates from the live state, without advancing it.
    pub fn predict_values(&self, obs: &[f32]) -> Vec<f32> {
        let obs = self.obs_tensor(obs);
        let out = self
            .model
            .valid()
            .forward_step(obs, Some(self.live_state.clone()));
        out.values.into_data().iter::<f32>().collect()
    }

    /// Zero the live state of every environment.
    pub fn reset_hidden(&mut self) {
        self.live_state = RecurrentState::zeros(
            self.model.lstm_layers(),
            self.n_envs,
            self.model.lstm_hidden(),
            &self.device,
        );
    }

    /// Zero the live state of finished environments.
    pub fn reset_hidden_where(&mut self, dones: &[bool]) {
        self.live_state = self.live_state.clone().reset_where(dones);
    }

    /// Snapshot the live state as the start of a new window.
    ///
    /// Must be called before the first transition of the window. A call
    /// with a non-empty buffer is a logic error: it panics in debug builds
    /// and is ignored otherwise.
    pub fn store_initial_hidden(&mut self) {
        debug_assert!(
            self.buffer.is_empty(),
            "store_initial_hidden called with {} steps already buffered",
            self.buffer.len()
        );
        if !self.buffer.is_empty() {
            log::warn!("ignoring store_initial_hidden on a non-empty rollout buffer");
            return;
        }
        self.buffer.set_initial_state(self.live_state.detach());
    }

    /// Record one vectorized step.
    pub fn store_transition(
        &mut self,
        obs: &[f32],
        actions: &[Vec<u32>],
        log_probs: &[f32],
        values: &[f32],
        rewards: &[f32],
        dones: &[bool],
    ) {
        self.buffer.push_step(RolloutStep {
            observations: obs.to_vec(),
            actions: actions.iter().flatten().copied().collect(),
            log_probs: log_probs.to_vec(),
            values: values.to_vec(),
            rewards: rewards.to_vec(),
            dones: dones.to_vec(),
        });
    }

    /// Set the entropy coefficient for `env_steps` environment steps so far.
    pub fn anneal_entropy(&mut self, env_steps: u64) {
        self.entropy_coef = self.config.entropy.coef_at(env_steps);
    }

    /// Advantages and returns for the buffered window.
    pub fn compute_gae(&self, next_values: &[f32]) -> GaeOutput {
        compute_gae_vectorized(
            self.buffer.rewards(),
            self.buffer.values(),
            self.buffer.dones(),
            next_values,
            self.n_envs,
            self.config.gamma,
            self.config.gae_lambda,
        )
    }

    /// Run `update_epochs` PPO epochs over the buffered window, then clear it.
    ///
    /// # Panics
    /// Panics if the buffer does not hold a full window.
    pub fn update(&mut self, next_values: &[f32]) -> UpdateStats {
        assert!(
            self.buffer.is_full(),
            "update requires a full rollout buffer ({} of {} steps)",
            self.buffer.len(),
            self.config.rollout_len
        );

        let GaeOutput {
            mut advantages,
            returns,
        } = self.compute_gae(next_values);
        normalize_advantages(&mut advantages);

        let steps = self.buffer.len();
        let obs_dim = self.model.obs_dim();
        let obs = Tensor::<B, 3>::from_data(
            TensorData::new(
                self.buffer.observations_env_major(),
                [self.n_envs, steps, obs_dim],
            ),
            &self.device,
        );
        let dones = self.buffer.dones_per_step();
        let initial = self.buffer.initial_state().cloned().map(RecurrentState::from_inner);
        let old_log_probs_host = self.buffer.log_probs().to_vec();
        let old_log_probs = Tensor::<B, 1>::from_floats(old_log_probs_host.as_slice(), &self.device);
        let advantages = Tensor::<B, 1>::from_floats(advantages.as_slice(), &self.device);
        let returns = Tensor::<B, 1>::from_floats(returns.as_slice(), &self.device);

        let mut totals = UpdateStats::default();
        for epoch in 0..self.config.update_epochs {
            let eval = self.model.evaluate_actions(
                obs.clone(),
                self.buffer.actions(),
                &dones,
                initial.clone(),
            );

            let new_log_probs: Vec<f32> = eval.log_probs.clone().into_data().iter::<f32>().collect();
            let mean_entropy: f32 = eval.entropy.clone().mean().into_scalar().elem();

            let policy = ppo_clip_loss(
                eval.log_probs,
                old_log_probs.clone(),
                advantages.clone(),
                self.config.clip_ratio,
            );
            let value = value_loss(eval.values, returns.clone());
            let policy_val: f32 = policy.clone().into_scalar().elem();
            let value_val: f32 = value.clone().into_scalar().elem();

            let loss = combined_loss(
                policy,
                value,
                entropy_loss(eval.entropy),
                self.config.vf_coef,
                self.entropy_coef,
            );

            let mut grads = GradientsParams::from_grads(loss.backward(), &self.model);
            let grad_norm = match self.config.max_grad_norm {
                Some(max_norm) => clip_grad_norm::<B, _>(&self.model, &mut grads, max_norm),
                None => global_grad_norm::<B, _>(&self.model, &grads),
            };
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            let kl = approx_kl(&new_log_probs, &old_log_probs_host);
            let clipped = clip_fraction(&new_log_probs, &old_log_probs_host, self.config.clip_ratio);
            log::debug!(
                "epoch {}: policy={:.4} value={:.4} entropy={:.4} kl={:.5} grad_norm={:.3}",
                epoch,
                policy_val,
                value_val,
                mean_entropy,
                kl,
                grad_norm
            );

            totals.policy_loss += policy_val;
            totals.value_loss += value_val;
            totals.entropy += mean_entropy;
            totals.grad_norm += grad_norm;
            totals.approx_kl += kl;
            totals.clip_fraction += clipped;
        }

        self.buffer.clear();

        let epochs = self.config.update_epochs as f32;
        UpdateStats {
            policy_loss: totals.policy_loss / epochs,
            value_loss: totals.value_loss / epochs,
            entropy: totals.entropy / epochs,
            grad_norm: totals.grad_norm / epochs,
            approx_kl: totals.approx_kl / epochs,
            clip_fraction: totals.clip_fraction / epochs,
        }
    }
}
