//! Test suite for the runners module.
//!
//! - `config_tests`: PPO configuration defaults, validation and serde
//! - `trainer_tests`: the training loop against a scripted environment
//!
//! # Invariants Tested
//!
//! 1. **Window lifecycle**: every update sees a full buffer and leaves it empty
//! 2. **Episode boundaries**: finished environments are reset along with
//!    their recurrent rows, and counted once
//! 3. **Truncation**: episodes stop at `base_episode_length * jad_count`
