//! Configuration for recurrent PPO training.
//!
//! Builder-style settings validated by [`PPOConfig::validate`] or
//! [`PPOConfig::build`], plus the shared [`ConfigError`] used by every
//! validated configuration in the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Env steps over which the entropy bonus anneals, per jad.
pub const ENTROPY_ANNEAL_STEPS_PER_JAD: u64 = 500_000;

/// Entropy coefficient scheduling strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntropySchedule {
    /// Constant entropy coefficient throughout training.
    Constant { coef: f32 },
    /// Linear interpolation from `start` to `end` over `anneal_steps` env steps,
    /// then held at `end`.
    Linear { start: f32, end: f32, anneal_steps: u64 },
}

impl Default for EntropySchedule {
    fn default() -> Self {
        EntropySchedule::Constant { coef: 0.01 }
    }
}

impl EntropySchedule {
    pub fn constant(coef: f32) -> Self {
        EntropySchedule::Constant { coef }
    }

    pub fn linear(start: f32, end: f32, anneal_steps: u64) -> Self {
        EntropySchedule::Linear {
            start,
            end,
            anneal_steps,
        }
    }

    /// Schedule used when none is configured explicitly.
    ///
    /// Multi-jad fights start more exploratory: 0.05 decaying to 0.005 over
    /// `jad_count * 500_000` env steps. A single jad keeps 0.01.
    pub fn for_jad_count(jad_count: usize) -> Self {
        if jad_count >= 2 {
            Self::linear(0.05, 0.005, jad_count as u64 * ENTROPY_ANNEAL_STEPS_PER_JAD)
        } else {
            Self::constant(0.01)
        }
    }

    /// Coefficient after `env_steps` environment steps.
    pub fn coef_at(&self, env_steps: u64) -> f32 {
        match *self {
            EntropySchedule::Constant { coef } => coef,
            EntropySchedule::Linear {
                start,
                end,
                anneal_steps,
            } => {
                if anneal_steps == 0 {
                    return end;
                }
                let progress = (env_steps as f64 / anneal_steps as f64).min(1.0) as f32;
                start + (end - start) * progress
            }
        }
    }

    /// Coefficient at step zero.
    pub fn initial(&self) -> f32 {
        self.coef_at(0)
    }
}

/// Configuration validation error.
///
/// Returned when configuration parameters are invalid or inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Two components disagree on a size.
    Mismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A value read from text (environment variable, CLI) did not parse.
    Parse { field: &'static str, value: String },
    /// A named option is not one of the known choices.
    Unknown {
        field: &'static str,
        value: String,
        expected: &'static [&'static str],
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
            ConfigError::Mismatch {
                field,
                expected,
                actual,
            } => write!(f, "{} mismatch: expected {}, got {}", field, expected, actual),
            ConfigError::Parse { field, value } => {
                write!(f, "could not parse {} from '{}'", field, value)
            }
            ConfigError::Unknown {
                field,
                value,
                expected,
            } => write!(
                f,
                "unknown {} '{}', expected one of: {}",
                field,
                value,
                expected.join(", ")
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Check `min <= value <= max`.
pub(crate) fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Check `value > 0`.
pub(crate) fn check_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidCount { field, value });
    }
    Ok(())
}

/// Configuration for recurrent PPO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Vectorized steps collected before each update
    pub rollout_len: usize,
    /// Passes over the rollout per update
    pub update_epochs: usize,
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f32,
    /// GAE lambda parameter
    pub gae_lambda: f32,
    /// PPO clipping ratio
    pub clip_ratio: f32,
    /// Value function loss coefficient
    pub vf_coef: f32,
    /// Global gradient norm limit (None = no clipping)
    pub max_grad_norm: Option<f32>,
    pub entropy: EntropySchedule,
    pub lstm_hidden: usize,
    pub lstm_layers: usize,
    /// Width of both Tanh trunk layers
    pub trunk_width: usize,
    /// Seed for weight initialization and action sampling
    pub seed: Option<u64>,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            rollout_len: 512,
            update_epochs: 4,
            learning_rate: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_ratio: 0.2,
            vf_coef: 0.5,
            max_grad_norm: Some(0.5),
            entropy: EntropySchedule::default(),
            lstm_hidden: 64,
            lstm_layers: 1,
            trunk_width: 64,
            seed: None,
        }
    }
}

impl PPOConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate all configuration parameters.
    ///
    /// # Validation Rules
    /// - Counts (rollout_len, update_epochs, LSTM and trunk sizes) must be > 0
    /// - gamma and gae_lambda must be in [0, 1]
    /// - clip_ratio must be in (0, 1]
    /// - learning_rate must be in (0, 1]
    /// - entropy coefficients must be in [0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("rollout_len", self.rollout_len)?;
        check_count("update_epochs", self.update_epochs)?;
        check_count("lstm_hidden", self.lstm_hidden)?;
        check_count("lstm_layers", self.lstm_layers)?;
        check_count("trunk_width", self.trunk_width)?;

        check_range("gamma", self.gamma as f64, 0.0, 1.0)?;
        check_range("gae_lambda", self.gae_lambda as f64, 0.0, 1.0)?;
        if self.clip_ratio <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "clip_ratio",
                value: self.clip_ratio as f64,
                min: 0.0,
                max: 1.0,
            });
        }
        check_range("clip_ratio", self.clip_ratio as f64, 0.0, 1.0)?;
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "learning_rate",
                value: self.learning_rate,
                min: 0.0,
                max: 1.0,
            });
        }
        check_range("learning_rate", self.learning_rate, 0.0, 1.0)?;
        check_range("vf_coef", self.vf_coef as f64, 0.0, f64::MAX)?;
        if let Some(norm) = self.max_grad_norm {
            if norm <= 0.0 {
                return Err(ConfigError::OutOfRange {
                    field: "max_grad_norm",
                    value: norm as f64,
                    min: 0.0,
                    max: f64::MAX,
                });
            }
        }

        match self.entropy {
            EntropySchedule::Constant { coef } => check_range("entropy.coef", coef as f64, 0.0, 1.0)?,
            EntropySchedule::Linear { start, end, .. } => {
                check_range("entropy.start", start as f64, 0.0, 1.0)?;
                check_range("entropy.end", end as f64, 0.0, 1.0)?;
            }
        }

        Ok(())
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Set rollout length (vectorized steps per update).
    pub fn with_rollout_len(mut self, len: usize) -> Self {
        self.rollout_len = len;
        self
    }

    /// Set number of epochs per update.
    pub fn with_update_epochs(mut self, epochs: usize) -> Self {
        self.update_epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_gae_lambda(mut self, lambda: f32) -> Self {
        self.gae_lambda = lambda;
        self
    }

    pub fn with_clip_ratio(mut self, clip: f32) -> Self {
        self.clip_ratio = clip;
        self
    }

    pub fn with_vf_coef(mut self, coef: f32) -> Self {
        self.vf_coef = coef;
        self
    }

    pub fn with_max_grad_norm(mut self, norm: Option<f32>) -> Self {
        self.max_grad_norm = norm;
        self
    }

    pub fn with_entropy(mut self, schedule: EntropySchedule) -> Self {
        self.entropy = schedule;
        self
    }

    pub fn with_lstm_hidden(mut self, hidden: usize) -> Self {
        self.lstm_hidden = hidden;
        self
    }

    pub fn with_lstm_layers(mut self, layers: usize) -> Self {
        self.lstm_layers = layers;
        self
    }

    pub fn with_trunk_width(mut self, width: usize) -> Self {
        self.trunk_width = width;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
