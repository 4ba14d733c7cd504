//! Recurrent PPO learner.
//!
//! - `PPOLearner`: acting, rollout storage and the clipped-surrogate update

pub mod ppo_learner;


pub use ppo_learner::{create_optimizer, ActionSelection, PPOLearner, UpdateStats};
