//! Environment abstraction.
//!
//! The trainer talks to the simulator only through [`EnvironmentAdapter`];
//! transports live in submodules.

pub mod process;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::jad::Observation;

pub use process::{ProcessEnv, ProcessEnvConfig};

/// Action sent to the simulator: one index, or one per head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvAction {
    Single(u32),
    Multi(Vec<u32>),
}

impl EnvAction {
    /// `Single` for one head, `Multi` otherwise.
    pub fn from_heads(actions: &[u32]) -> Self {
        match actions {
            [single] => EnvAction::Single(*single),
            many => EnvAction::Multi(many.to_vec()),
        }
    }
}

/// Result of `reset` or `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: Observation,
    #[serde(default)]
    pub reward: f32,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default)]
    pub valid_action_mask: Option<Vec<bool>>,
}

impl StepOutcome {
    pub fn new(observation: Observation) -> Self {
        Self {
            observation,
            reward: 0.0,
            terminated: false,
            valid_action_mask: None,
        }
    }

    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_terminated(mut self, terminated: bool) -> Self {
        self.terminated = terminated;
        self
    }
}

/// Environment adapter error.
#[derive(Debug)]
pub enum EnvError {
    /// `step` called before `reset`.
    NotStarted,
    /// The simulator process could not be spawned.
    Spawn(std::io::Error),
    /// The request/response stream broke.
    Protocol { message: String, stderr: String },
    /// A response was not valid JSON for the expected shape.
    Decode(serde_json::Error),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::NotStarted => write!(f, "environment not started: call reset() before step()"),
            EnvError::Spawn(e) => write!(f, "failed to spawn environment process: {}", e),
            EnvError::Protocol { message, stderr } => {
                if stderr.is_empty() {
                    write!(f, "{}", message)
                } else {
                    write!(f, "{}. Stderr: {}", message, stderr.trim_end())
                }
            }
            EnvError::Decode(e) => write!(f, "invalid environment response: {}", e),
        }
    }
}

impl std::error::Error for EnvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvError::Spawn(e) => Some(e),
            EnvError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(e: serde_json::Error) -> Self {
        EnvError::Decode(e)
    }
}

/// Request/response contract with one simulator instance.
pub trait EnvironmentAdapter {
    /// Start a new episode.
    fn reset(&mut self) -> Result<StepOutcome, EnvError>;

    /// Advance one tick.
    fn step(&mut self, action: &EnvAction) -> Result<StepOutcome, EnvError>;

    /// Shut down. Safe to call more than once.
    fn close(&mut self) -> Result<(), EnvError>;
}
