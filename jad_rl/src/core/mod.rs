//! Core numeric state shared by the normalizers, the model and the learner.

pub mod recurrent;
pub mod running_stats;

pub use recurrent::{RecurrentState, StackedLstm, StackedLstmConfig};
pub use running_stats::{RunningNormalizer, StatsError};
