//! Training checkpoints.
//!
//! Model, optimizer and normalizer state are saved together so a run can
//! resume where it stopped; the best model by average episode reward is
//! kept separately for evaluation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use jad_rl::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let config = CheckpointerConfig::new("./checkpoints")
//!     .with_save_interval(50_000)
//!     .with_keep_last_n(5);
//! let mut checkpointer = Checkpointer::new(config)?;
//!
//! if checkpointer.should_save(env_steps) {
//!     checkpointer.save(learner.model(), learner.optimizer(), &normalizer.to_archive(), env_steps, Some(avg_reward))?;
//! }
//! ```

pub mod checkpointer;

pub use checkpointer::{
    CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig, LoadedCheckpoint,
};
