//! # jad_rl: Recurrent PPO for Jad fights
//!
//! Trains an LSTM actor-critic with PPO against an external turn-based
//! combat simulator reached over line-delimited JSON.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Trainer                                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ProcessEnv × N ──► Observation ──► encode ──► Selective          │
//! │       ▲                                        Normalization      │
//! │       │                                            │              │
//! │       │ EnvAction                                  ▼              │
//! │       └──────────────── PPOLearner ◄── RecurrentActorCritic       │
//! │                            │               (trunk ─► LSTM ─► heads)│
//! │                            ▼                                      │
//! │                      RolloutBuffer ──► GAE ──► clipped update     │
//! │                            │                                      │
//! │                            ▼                                      │
//! │              Checkpointer (model, optimizer, normalizer)          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jad_rl::{
//!     action_count, create_optimizer, observation_dim, ConsoleLogger, JadConfig, ModelConfig,
//!     PPOConfig, PPOLearner, ProcessEnv, ProcessEnvConfig, Trainer, TrainerConfig,
//! };
//!
//! let jad = JadConfig::from_env()?;
//! let ppo = PPOConfig::new().with_seed(1).build()?;
//! let model = ModelConfig::from_ppo(observation_dim(&jad), vec![action_count(&jad)], &ppo)
//!     .init::<B>(&mut fastrand::Rng::with_seed(1), &device)?;
//! let learner = PPOLearner::new(model, create_optimizer(), ppo, 1, device);
//! let env = ProcessEnv::new(ProcessEnvConfig::new("./jad-sim").with_jad(jad));
//!
//! let mut trainer = Trainer::new(learner, vec![env], jad, TrainerConfig::new())?;
//! let summary = trainer.train(&mut ConsoleLogger::new(10))?;
//! ```

pub mod core;
pub mod normalization;
pub mod buffers;
pub mod algorithms;
pub mod nn;
pub mod model;
pub mod learner;
pub mod runners;
pub mod jad;
pub mod environment;
pub mod checkpoint;
pub mod metrics;

pub use core::{RecurrentState, RunningNormalizer, StatsError};
pub use normalization::{
    ArchiveError, NormalizationConfig, NormalizeMask, NormalizerArchive,
    SelectiveNormalizationLayer,
};
pub use buffers::{RolloutBuffer, RolloutBufferConfig, RolloutStep};
pub use model::{ModelConfig, RecurrentActorCritic};
pub use learner::{create_optimizer, ActionSelection, PPOLearner, UpdateStats};

// Training loop and configuration
pub use runners::{
    ConfigError, EntropySchedule, EvaluationSummary, PPOConfig, RewardSetting, RewardSource,
    TrainError, Trainer, TrainerConfig, TrainingSummary,
};

// Jad domain
pub use jad::{
    action_count, action_name, encode, normalize_mask, observation_dim, JadConfig, Observation,
    RewardFunction, TerminalRewards, TerminationState,
};

// Environment abstraction
pub use environment::{
    EnvAction, EnvError, EnvironmentAdapter, ProcessEnv, ProcessEnvConfig, StepOutcome,
};

// Model checkpointing
pub use checkpoint::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig, LoadedCheckpoint};

// Progress logging
pub use metrics::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, TrainingSnapshot};
