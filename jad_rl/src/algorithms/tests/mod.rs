//! Behavioral tests for the algorithm components.
//!
//! - `gae_tests`: advantage recursion, episode boundaries, normalization
//! - `policy_loss_tests`: tensor losses against their scalar forms

pub mod gae_tests;
