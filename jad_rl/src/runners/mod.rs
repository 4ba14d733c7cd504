//! Training configuration and the synchronous training loop.
//!
//! - [`PPOConfig`]: PPO hyperparameters and network sizes
//! - [`EntropySchedule`]: constant or linearly annealed entropy bonus
//! - [`Trainer`]: drives N environments through collect/update windows

pub mod ppo_config;
pub mod trainer;

#[cfg(test)]
mod tests;

pub use ppo_config::{ConfigError, EntropySchedule, PPOConfig, ENTROPY_ANNEAL_STEPS_PER_JAD};
pub use trainer::{
    EvaluationSummary, RewardSetting, RewardSource, TrainError, Trainer, TrainerConfig,
    TrainingSummary,
};
