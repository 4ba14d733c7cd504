//! Algorithm components for recurrent PPO.
//!
//! - `gae`: Generalized Advantage Estimation over a rollout window
//! - `policy_loss`: clipped surrogate, value and entropy losses
//! - `categorical`: per-head categorical distribution
//! - `grad_clip`: global-norm gradient clipping

pub mod categorical;
pub mod gae;
pub mod grad_clip;
pub mod policy_loss;

#[cfg(test)]
mod tests;

pub use categorical::Categorical;
pub use gae::{compute_gae, compute_gae_vectorized, normalize_advantages, GaeOutput};
pub use grad_clip::{clip_grad_norm, global_grad_norm};
pub use policy_loss::{
    approx_kl, clip_fraction, combined_loss, entropy_loss, ppo_clip_loss, ppo_clip_loss_scalar,
    value_loss, value_loss_scalar,
};
