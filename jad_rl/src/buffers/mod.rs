//! Experience storage for on-policy recurrent training.
//!
//! `RolloutBuffer` holds one fixed window of vectorized steps plus the
//! recurrent state the window began from; it is consumed and cleared by
//! every update.

pub mod rollout_buffer;

pub use rollout_buffer::{RolloutBuffer, RolloutBufferConfig, RolloutStep};
