//! Reward functions.
//!
//! A closed set of variants selected by name. Each is a pure function of
//! the current observation, the previous one (absent on the first tick),
//! how the episode ended and the episode length. Terminal magnitudes come
//! from [`TerminalRewards`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::observation::{Observation, HEALER_TARGET_JAD, HEALER_TARGET_PLAYER};
use crate::runners::ppo_config::ConfigError;

/// How (or whether) an episode ended on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Ongoing,
    PlayerDied,
    /// Every jad is dead.
    JadKilled,
    /// Hit the training episode cap.
    Truncated,
}

impl TerminationState {
    /// Classify a step. A terminated episode is a kill when all jads are
    /// dead and a death otherwise; a live episode at `max_len` is truncated.
    pub fn classify(obs: &Observation, terminated: bool, episode_len: usize, max_len: usize) -> Self {
        if terminated {
            if obs.all_jads_dead() {
                TerminationState::JadKilled
            } else {
                TerminationState::PlayerDied
            }
        } else if episode_len >= max_len {
            TerminationState::Truncated
        } else {
            TerminationState::Ongoing
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(self, TerminationState::Ongoing)
    }
}

/// Terminal reward magnitudes. Penalties are stored with their sign.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminalRewards {
    pub win_bonus: f32,
    /// Subtracted per tick of episode length on a win
    pub win_step_penalty: f32,
    pub death_penalty: f32,
    pub truncation_penalty: f32,
}

impl TerminalRewards {
    /// Starting values for `function`.
    pub fn for_function(function: RewardFunction) -> Self {
        match function {
            RewardFunction::Shaped => Self {
                win_bonus: 100.0,
                win_step_penalty: 0.1,
                death_penalty: -50.0,
                truncation_penalty: -150.0,
            },
            RewardFunction::Survival => Self {
                win_bonus: 100.0,
                win_step_penalty: 0.25,
                death_penalty: -100.0,
                truncation_penalty: -100.0,
            },
            RewardFunction::Sparse => Self {
                win_bonus: 1.0,
                win_step_penalty: 0.0,
                death_penalty: -1.0,
                truncation_penalty: -1.0,
            },
        }
    }

    pub fn with_death_penalty(mut self, penalty: f32) -> Self {
        self.death_penalty = penalty;
        self
    }

    pub fn with_truncation_penalty(mut self, penalty: f32) -> Self {
        self.truncation_penalty = penalty;
        self
    }

    /// Terminal component only.
    pub fn terminal(&self, termination: TerminationState, episode_len: usize) -> f32 {
        match termination {
            TerminationState::Ongoing => 0.0,
            TerminationState::JadKilled => {
                self.win_bonus - self.win_step_penalty * episode_len as f32
            }
            TerminationState::PlayerDied => self.death_penalty,
            TerminationState::Truncated => self.truncation_penalty,
        }
    }
}

/// Available reward shaping variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardFunction {
    /// Prayer feedback, damage trading, jad healing and healer tagging.
    #[serde(rename = "default")]
    Shaped,
    /// Prayer feedback plus a per-tick survival bonus.
    #[serde(rename = "survival")]
    Survival,
    /// Terminal outcome only.
    #[serde(rename = "sparse")]
    Sparse,
}

impl RewardFunction {
    pub const NAMES: &'static [&'static str] = &["default", "survival", "sparse"];

    pub fn name(&self) -> &'static str {
        match self {
            RewardFunction::Shaped => "default",
            RewardFunction::Survival => "survival",
            RewardFunction::Sparse => "sparse",
        }
    }

    /// Raw (unscaled) reward for one tick.
    pub fn compute(
        &self,
        obs: &Observation,
        prev: Option<&Observation>,
        termination: TerminationState,
        episode_len: usize,
        terminal: &TerminalRewards,
    ) -> f32 {
        let shaping = match self {
            RewardFunction::Shaped => shaped(obs, prev),
            RewardFunction::Survival => survival(obs, prev),
            RewardFunction::Sparse => 0.0,
        };
        shaping + terminal.terminal(termination, episode_len)
    }
}

impl FromStr for RewardFunction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(RewardFunction::Shaped),
            "survival" => Ok(RewardFunction::Survival),
            "sparse" => Ok(RewardFunction::Sparse),
            other => Err(ConfigError::Unknown {
                field: "reward_function",
                value: other.to_string(),
                expected: Self::NAMES,
            }),
        }
    }
}

/// +1 for each jad that was attacking last tick and is now prayed against,
/// -1 for each that is not.
fn prayer_feedback(obs: &Observation, prev: &Observation) -> f32 {
    prev.jads
        .iter()
        .filter(|j| j.attack != 0)
        .map(|j| if obs.active_prayer == j.attack { 1.0 } else { -1.0 })
        .sum()
}

fn damage_taken(obs: &Observation, prev: &Observation) -> f32 {
    (prev.player_hp - obs.player_hp).max(0) as f32
}

fn shaped(obs: &Observation, prev: Option<&Observation>) -> f32 {
    let mut reward = 0.0;
    if obs.player_target == 0 {
        reward -= 0.5;
    }
    let Some(prev) = prev else {
        return reward;
    };

    reward += prayer_feedback(obs, prev);
    reward -= 0.1 * damage_taken(obs, prev);

    // jads paired by index; healing on one does not cancel damage on another
    for (now, before) in obs.jads.iter().zip(&prev.jads) {
        let delta = before.hp - now.hp;
        if delta > 0 {
            reward += 0.2 * delta as f32;
        } else if delta < 0 {
            reward -= 0.3 * (-delta) as f32;
        }
    }

    let tagged = obs
        .healers
        .iter()
        .zip(&prev.healers)
        .filter(|(now, before)| {
            before.target == HEALER_TARGET_JAD && now.target == HEALER_TARGET_PLAYER
        })
        .count();
    reward + 5.0 * tagged as f32
}

fn survival(obs: &Observation, prev: Option<&Observation>) -> f32 {
    let mut reward = 0.1;
    if obs.player_target == 0 {
        reward -= 1.0;
    }
    if let Some(prev) = prev {
        reward += prayer_feedback(obs, prev);
        reward -= 0.1 * damage_taken(obs, prev);
        let dealt = (prev.total_jad_hp() - obs.total_jad_hp()).max(0);
        reward += 0.1 * dealt as f32;
    }
    reward
}
