//! Jad fight domain: configuration, action table, observation encoding and
//! reward functions.

pub mod actions;
pub mod config;
pub mod observation;
pub mod rewards;

pub use actions::{action_count, action_name};
pub use config::{JadConfig, BASE_EPISODE_LENGTH};
pub use observation::{
    encode, normalize_mask, observation_dim, HealerState, JadState, Observation,
};
pub use rewards::{RewardFunction, TerminalRewards, TerminationState};
