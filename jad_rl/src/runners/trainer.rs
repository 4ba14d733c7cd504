//! Synchronous training loop.
//!
//! One [`Trainer`] drives `n_envs` simulator instances in lockstep. Each
//! tick selects actions for every environment, steps them, shapes and
//! normalizes the rewards and stores the transition; every `rollout_len`
//! ticks the learner updates on the window.
//!
//! ```text
//! ┌──────────── tick ────────────┐
//! │ store_initial_hidden (empty) │
//! │ anneal_entropy               │
//! │ select_action ─► env.step ×N │
//! │ reward + truncation          │
//! │ normalize_rewards            │
//! │ store_transition             │
//! │ reset finished envs / rows   │
//! │ normalize_observations       │
//! └──────────────┬───────────────┘
//!                ▼ window full
//!   predict_values ─► update ─► log ─► checkpoint
//! ```

use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::ppo_config::{check_count, ConfigError};
use crate::checkpoint::{CheckpointError, Checkpointer, CheckpointerConfig, LoadedCheckpoint};
use crate::environment::{EnvAction, EnvError, EnvironmentAdapter, StepOutcome};
use crate::jad::{
    encode, normalize_mask, observation_dim, JadConfig, Observation, RewardFunction,
    TerminalRewards, TerminationState, BASE_EPISODE_LENGTH,
};
use crate::learner::{PPOLearner, UpdateStats};
use crate::metrics::{MetricsLogger, TrainingSnapshot};
use crate::model::RecurrentActorCritic;
use crate::normalization::{
    ArchiveError, NormalizationConfig, NormalizerArchive, SelectiveNormalizationLayer,
};

/// Where the per-step reward comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    /// Reward reported by the simulator; only truncation is added locally.
    Environment,
    /// Reward computed here from consecutive observations.
    Local,
}

/// Reward configuration for training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardSetting {
    pub source: RewardSource,
    pub function: RewardFunction,
    /// Terminal magnitudes; the function's defaults when absent
    pub terminal: Option<TerminalRewards>,
}

impl Default for RewardSetting {
    fn default() -> Self {
        Self::environment(RewardFunction::Shaped)
    }
}

impl RewardSetting {
    pub fn environment(function: RewardFunction) -> Self {
        Self {
            source: RewardSource::Environment,
            function,
            terminal: None,
        }
    }

    pub fn local(function: RewardFunction) -> Self {
        Self {
            source: RewardSource::Local,
            function,
            terminal: None,
        }
    }

    pub fn with_terminal(mut self, terminal: TerminalRewards) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn terminal(&self) -> TerminalRewards {
        self.terminal
            .unwrap_or_else(|| TerminalRewards::for_function(self.function))
    }

    /// Raw reward for one step.
    pub fn reward(
        &self,
        outcome: &StepOutcome,
        prev: Option<&Observation>,
        termination: TerminationState,
        episode_len: usize,
    ) -> f32 {
        let terminal = self.terminal();
        match self.source {
            RewardSource::Environment => {
                let truncation = if termination == TerminationState::Truncated {
                    terminal.truncation_penalty
                } else {
                    0.0
                };
                outcome.reward + truncation
            }
            RewardSource::Local => self.function.compute(
                &outcome.observation,
                prev,
                termination,
                episode_len,
                &terminal,
            ),
        }
    }
}

/// Configuration for [`Trainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub n_envs: usize,
    /// Stop once this many env steps have been collected (whole windows)
    pub max_env_steps: usize,
    /// Episode cap per jad; the cap is this times the jad count
    pub base_episode_length: usize,
    pub reward: RewardSetting,
    pub normalization: NormalizationConfig,
    /// Updates between console rows and info logs
    pub log_interval: usize,
    /// Finished episodes averaged for reward statistics
    pub stats_window: usize,
    pub checkpoint: Option<CheckpointerConfig>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            n_envs: 1,
            max_env_steps: 1_000_000,
            base_episode_length: BASE_EPISODE_LENGTH,
            reward: RewardSetting::default(),
            normalization: NormalizationConfig::default(),
            log_interval: 1,
            stats_window: 100,
            checkpoint: None,
        }
    }
}

impl TrainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("n_envs", self.n_envs)?;
        check_count("max_env_steps", self.max_env_steps)?;
        check_count("base_episode_length", self.base_episode_length)?;
        check_count("log_interval", self.log_interval)?;
        check_count("stats_window", self.stats_window)?;
        if let Some(checkpoint) = &self.checkpoint {
            check_count("checkpoint.save_interval", checkpoint.save_interval)?;
        }
        Ok(())
    }

    pub fn with_n_envs(mut self, n_envs: usize) -> Self {
        self.n_envs = n_envs;
        self
    }

    pub fn with_max_env_steps(mut self, steps: usize) -> Self {
        self.max_env_steps = steps;
        self
    }

    pub fn with_base_episode_length(mut self, len: usize) -> Self {
        self.base_episode_length = len;
        self
    }

    pub fn with_reward(mut self, reward: RewardSetting) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_normalization(mut self, normalization: NormalizationConfig) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointerConfig) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }
}

/// Error raised by the training or evaluation loop.
#[derive(Debug)]
pub enum TrainError {
    Config(ConfigError),
    Env(EnvError),
    Checkpoint(CheckpointError),
    Archive(ArchiveError),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Config(e) => write!(f, "invalid configuration: {}", e),
            TrainError::Env(e) => write!(f, "environment error: {}", e),
            TrainError::Checkpoint(e) => write!(f, "checkpoint error: {}", e),
            TrainError::Archive(e) => write!(f, "normalizer archive error: {}", e),
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainError::Config(e) => Some(e),
            TrainError::Env(e) => Some(e),
            TrainError::Checkpoint(e) => Some(e),
            TrainError::Archive(e) => Some(e),
        }
    }
}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        TrainError::Config(e)
    }
}

impl From<EnvError> for TrainError {
    fn from(e: EnvError) -> Self {
        TrainError::Env(e)
    }
}

impl From<CheckpointError> for TrainError {
    fn from(e: CheckpointError) -> Self {
        TrainError::Checkpoint(e)
    }
}

impl From<ArchiveError> for TrainError {
    fn from(e: ArchiveError) -> Self {
        TrainError::Archive(e)
    }
}

/// Outcome of [`Trainer::train`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    pub updates: usize,
    pub episodes: usize,
    pub wins: usize,
    pub env_steps: usize,
    /// Best recent-episode average seen after any update
    pub best_avg_reward: Option<f32>,
    pub last_stats: UpdateStats,
}

/// Outcome of [`Trainer::evaluate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationSummary {
    pub episodes: usize,
    pub wins: usize,
    pub avg_reward: f32,
    pub avg_length: f32,
}

impl EvaluationSummary {
    pub fn win_rate(&self) -> f32 {
        if self.episodes == 0 {
            0.0
        } else {
            self.wins as f32 / self.episodes as f32
        }
    }
}

/// Per-environment episode progress.
#[derive(Debug, Clone, Default)]
struct EpisodeTracker {
    prev: Option<Observation>,
    len: usize,
    reward: f32,
}

/// One finished episode.
#[derive(Debug, Clone, Copy)]
struct EpisodeRecord {
    reward: f32,
    len: usize,
    won: bool,
}

/// Rolling episode statistics.
#[derive(Debug, Clone)]
struct EpisodeStats {
    episodes: usize,
    wins: usize,
    window: usize,
    recent: VecDeque<EpisodeRecord>,
}

impl EpisodeStats {
    fn new(window: usize) -> Self {
        Self {
            episodes: 0,
            wins: 0,
            window,
            recent: VecDeque::with_capacity(window),
        }
    }

    fn record(&mut self, record: EpisodeRecord) {
        self.episodes += 1;
        if record.won {
            self.wins += 1;
        }
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(record);
    }

    fn avg_reward(&self) -> Option<f32> {
        if self.recent.is_empty() {
            return None;
        }
        Some(self.recent.iter().map(|r| r.reward).sum::<f32>() / self.recent.len() as f32)
    }

    fn avg_len(&self) -> f32 {
        if self.recent.is_empty() {
            return 0.0;
        }
        self.recent.iter().map(|r| r.len as f32).sum::<f32>() / self.recent.len() as f32
    }
}

/// Result of stepping every environment once.
struct TickOutcome {
    raw_rewards: Vec<f32>,
    dones: Vec<bool>,
    finished: Vec<EpisodeRecord>,
}

/// Synchronous recurrent PPO trainer over `n_envs` environments.
pub struct Trainer<B, O, E>
where
    B: AutodiffBackend,
    O: Optimizer<RecurrentActorCritic<B>, B>,
    E: EnvironmentAdapter,
{
    learner: PPOLearner<B, O>,
    envs: Vec<E>,
    jad: JadConfig,
    config: TrainerConfig,
    normalizer: SelectiveNormalizationLayer,
    checkpointer: Option<Checkpointer>,
    trackers: Vec<EpisodeTracker>,
    /// Normalized observations the next actions are chosen from
    current_obs: Vec<f32>,
    started: bool,
    env_steps: usize,
    updates: usize,
    stats: EpisodeStats,
    best_avg_reward: Option<f32>,
}

impl<B, O, E> Trainer<B, O, E>
where
    B: AutodiffBackend,
    O: Optimizer<RecurrentActorCritic<B>, B>,
    E: EnvironmentAdapter,
{
    /// Wire a learner to its environments.
    ///
    /// The environment count, the learner's batch and the model's input
    /// size must all agree with `config` and `jad`.
    pub fn new(
        learner: PPOLearner<B, O>,
        envs: Vec<E>,
        jad: JadConfig,
        config: TrainerConfig,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        learner.config().validate()?;
        if envs.len() != config.n_envs {
            return Err(ConfigError::Mismatch {
                field: "environments",
                expected: config.n_envs,
                actual: envs.len(),
            }
            .into());
        }
        if learner.n_envs() != config.n_envs {
            return Err(ConfigError::Mismatch {
                field: "learner n_envs",
                expected: config.n_envs,
                actual: learner.n_envs(),
            }
            .into());
        }
        let obs_dim = observation_dim(&jad);
        if learner.model().obs_dim() != obs_dim {
            return Err(ConfigError::Mismatch {
                field: "obs_dim",
                expected: obs_dim,
                actual: learner.model().obs_dim(),
            }
            .into());
        }

        let checkpointer = match &config.checkpoint {
            Some(c) => Some(Checkpointer::new(c.clone())?),
            None => None,
        };
        let normalizer = SelectiveNormalizationLayer::new(
            normalize_mask(&jad),
            config.n_envs,
            config.normalization.clone(),
        );

        Ok(Self {
            trackers: vec![EpisodeTracker::default(); config.n_envs],
            current_obs: Vec::new(),
            started: false,
            env_steps: 0,
            updates: 0,
            stats: EpisodeStats::new(config.stats_window),
            best_avg_reward: None,
            learner,
            envs,
            jad,
            config,
            normalizer,
            checkpointer,
        })
    }

    pub fn learner(&self) -> &PPOLearner<B, O> {
        &self.learner
    }

    pub fn normalizer(&self) -> &SelectiveNormalizationLayer {
        &self.normalizer
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn envs(&self) -> &[E] {
        &self.envs
    }

    pub fn jad(&self) -> &JadConfig {
        &self.jad
    }

    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    pub fn max_episode_length(&self) -> usize {
        self.jad.max_episode_length(self.config.base_episode_length)
    }

    /// Continue from a saved checkpoint: weights, optimizer state,
    /// normalizer statistics and the env step counter.
    pub fn restore(
        &mut self,
        checkpoint: LoadedCheckpoint<RecurrentActorCritic<B>, O>,
    ) -> Result<(), TrainError> {
        if let Some(archive) = &checkpoint.normalizer {
            self.normalizer.load_archive(archive)?;
        }
        self.learner.load(checkpoint.model, checkpoint.optimizer);
        self.env_steps = checkpoint.step;
        self.started = false;
        log::info!("resumed from step {}", checkpoint.step);
        Ok(())
    }

    /// Load normalizer statistics (e.g. the best model's) without touching
    /// the learner.
    pub fn load_normalizer(&mut self, archive: &NormalizerArchive) -> Result<(), TrainError> {
        self.normalizer.load_archive(archive)?;
        Ok(())
    }

    /// Reset every environment and the live recurrent state.
    fn reset_all(&mut self) -> Result<(), TrainError> {
        let mut raw = Vec::with_capacity(self.envs.len() * observation_dim(&self.jad));
        for (env, tracker) in self.envs.iter_mut().zip(self.trackers.iter_mut()) {
            let outcome = env.reset()?;
            raw.extend(encode(&outcome.observation, &self.jad));
            *tracker = EpisodeTracker {
                prev: Some(outcome.observation),
                ..Default::default()
            };
        }
        self.normalizer.reset();
        self.learner.reset_hidden();
        self.current_obs = self.normalizer.normalize_observations(&raw);
        self.started = true;
        Ok(())
    }

    /// Act, step every environment and reset the ones that finished.
    ///
    /// Leaves the next normalized observation batch in `current_obs`.
    fn step_envs(&mut self, actions: &[Vec<u32>]) -> Result<TickOutcome, TrainError> {
        let max_len = self.max_episode_length();
        let n = self.envs.len();
        let mut raw_obs = Vec::with_capacity(self.current_obs.len());
        let mut raw_rewards = Vec::with_capacity(n);
        let mut dones = Vec::with_capacity(n);
        let mut finished = Vec::new();

        for (i, env) in self.envs.iter_mut().enumerate() {
            let outcome = env.step(&EnvAction::from_heads(&actions[i]))?;
            let tracker = &mut self.trackers[i];
            tracker.len += 1;

            let termination = TerminationState::classify(
                &outcome.observation,
                outcome.terminated,
                tracker.len,
                max_len,
            );
            let reward =
                self.config
                    .reward
                    .reward(&outcome, tracker.prev.as_ref(), termination, tracker.len);
            tracker.reward += reward;
            raw_rewards.push(reward);

            let done = termination.is_done();
            dones.push(done);
            if done {
                finished.push(EpisodeRecord {
                    reward: tracker.reward,
                    len: tracker.len,
                    won: termination == TerminationState::JadKilled,
                });
                let reset = env.reset()?;
                raw_obs.extend(encode(&reset.observation, &self.jad));
                *tracker = EpisodeTracker {
                    prev: Some(reset.observation),
                    ..Default::default()
                };
            } else {
                raw_obs.extend(encode(&outcome.observation, &self.jad));
                tracker.prev = Some(outcome.observation);
            }
        }

        self.current_obs = self.normalizer.normalize_observations(&raw_obs);
        Ok(TickOutcome {
            raw_rewards,
            dones,
            finished,
        })
    }

    /// One training tick over all environments.
    fn tick(&mut self) -> Result<(), TrainError> {
        if self.learner.buffer().is_empty() {
            self.learner.store_initial_hidden();
        }
        self.learner.anneal_entropy(self.env_steps as u64);

        let obs = self.current_obs.clone();
        let selection = self.learner.select_action(&obs, false);
        let outcome = self.step_envs(&selection.actions)?;

        let rewards = self
            .normalizer
            .normalize_rewards(&outcome.raw_rewards, &outcome.dones);
        self.learner.store_transition(
            &obs,
            &selection.actions,
            &selection.log_probs,
            &selection.values,
            &rewards,
            &outcome.dones,
        );
        self.learner.reset_hidden_where(&outcome.dones);

        for record in outcome.finished {
            log::debug!(
                "episode finished: reward {:.2}, length {}, {}",
                record.reward,
                record.len,
                if record.won { "win" } else { "loss" }
            );
            self.stats.record(record);
        }
        self.env_steps += self.envs.len();
        Ok(())
    }

    /// Collect one window and update on it.
    fn train_window(&mut self, logger: &mut dyn MetricsLogger) -> Result<UpdateStats, TrainError> {
        while !self.learner.buffer().is_full() {
            self.tick()?;
        }

        let next_values = self.learner.predict_values(&self.current_obs);
        let stats = self.learner.update(&next_values);
        self.updates += 1;

        let avg_reward = self.stats.avg_reward();
        if let Some(avg) = avg_reward {
            if self.best_avg_reward.map_or(true, |best| avg > best) {
                self.best_avg_reward = Some(avg);
            }
        }

        let snapshot = TrainingSnapshot::new(
            self.updates,
            self.env_steps,
            self.stats.episodes,
            avg_reward.unwrap_or(0.0),
        )
        .with_update_stats(&stats)
        .with_wins(self.stats.wins)
        .with_avg_episode_len(self.stats.avg_len())
        .with_entropy_coef(self.learner.entropy_coef())
        .with_learning_rate(self.learner.config().learning_rate);
        logger.log(&snapshot);

        if self.updates % self.config.log_interval == 0 {
            log::info!(
                "update {} | steps {} | episodes {} | wins {} | avg reward {:.2} | kl {:.4}",
                self.updates,
                self.env_steps,
                self.stats.episodes,
                self.stats.wins,
                snapshot.avg_reward,
                stats.approx_kl
            );
        }

        if let Some(checkpointer) = self.checkpointer.as_mut() {
            if checkpointer.should_save(self.env_steps) {
                checkpointer.save::<B, _, _>(
                    self.learner.model(),
                    self.learner.optimizer(),
                    &self.normalizer.to_archive(),
                    self.env_steps,
                    avg_reward,
                )?;
            }
        }

        Ok(stats)
    }

    /// Train until `max_env_steps`, in whole windows.
    pub fn train(&mut self, logger: &mut dyn MetricsLogger) -> Result<TrainingSummary, TrainError> {
        if !self.started {
            self.reset_all()?;
        }
        self.normalizer.set_training(true);

        log::info!(
            "training: {} envs, {} jads x {} healers, obs_dim {}, window {} steps",
            self.envs.len(),
            self.jad.jad_count(),
            self.jad.healers_per_jad(),
            observation_dim(&self.jad),
            self.learner.config().rollout_len
        );

        let mut last_stats = UpdateStats::default();
        while self.env_steps < self.config.max_env_steps {
            last_stats = self.train_window(logger)?;
        }
        logger.flush();

        if let Some(checkpointer) = self.checkpointer.as_mut() {
            let already_saved = checkpointer
                .find_latest_checkpoint()
                .map(|c| c.step == self.env_steps)
                .unwrap_or(false);
            if !already_saved {
                checkpointer.save::<B, _, _>(
                    self.learner.model(),
                    self.learner.optimizer(),
                    &self.normalizer.to_archive(),
                    self.env_steps,
                    self.stats.avg_reward(),
                )?;
            }
        }

        Ok(TrainingSummary {
            updates: self.updates,
            episodes: self.stats.episodes,
            wins: self.stats.wins,
            env_steps: self.env_steps,
            best_avg_reward: self.best_avg_reward,
            last_stats,
        })
    }

    /// Play `episodes` deterministic episodes with frozen normalization.
    ///
    /// Environments are reset before and after, so a following `train`
    /// starts fresh episodes.
    pub fn evaluate(&mut self, episodes: usize) -> Result<EvaluationSummary, TrainError> {
        if episodes == 0 {
            return Ok(EvaluationSummary::default());
        }
        let mut results: Vec<EpisodeRecord> = Vec::with_capacity(episodes);

        self.normalizer.set_training(false);
        let outcome = self.evaluate_inner(episodes, &mut results);
        self.normalizer.set_training(true);
        outcome?;
        self.started = false;

        let n = results.len() as f32;
        Ok(EvaluationSummary {
            episodes: results.len(),
            wins: results.iter().filter(|r| r.won).count(),
            avg_reward: results.iter().map(|r| r.reward).sum::<f32>() / n,
            avg_length: results.iter().map(|r| r.len as f32).sum::<f32>() / n,
        })
    }

    fn evaluate_inner(
        &mut self,
        episodes: usize,
        results: &mut Vec<EpisodeRecord>,
    ) -> Result<(), TrainError> {
        self.reset_all()?;
        while results.len() < episodes {
            let obs = self.current_obs.clone();
            let selection = self.learner.select_action(&obs, true);
            let outcome = self.step_envs(&selection.actions)?;
            self.learner.reset_hidden_where(&outcome.dones);
            for record in outcome.finished {
                if results.len() < episodes {
                    results.push(record);
                }
            }
        }
        Ok(())
    }

    /// Close every environment.
    pub fn close(&mut self) -> Result<(), TrainError> {
        for env in &mut self.envs {
            env.close()?;
        }
        self.started = false;
        Ok(())
    }
}
