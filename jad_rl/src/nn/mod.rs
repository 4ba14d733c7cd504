//! Neural network helpers.
//!
//! - [`orthogonal`]: orthogonal initialization for linear layers

pub mod orthogonal;

pub use orthogonal::{
    orthogonal_matrix, OrthogonalLinearConfig, HIDDEN_GAIN, POLICY_GAIN, VALUE_GAIN,
};
