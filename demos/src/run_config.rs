//! Run file shared by `train` and `evaluate`.

use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use jad_rl::{
    action_count, observation_dim, EntropySchedule, JadConfig, ModelConfig, PPOConfig,
    ProcessEnv, ProcessEnvConfig, RecurrentActorCritic, TrainerConfig,
};

#[cfg(not(feature = "wgpu"))]
pub type Inner = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
pub type Inner = burn::backend::Wgpu;

pub type B = burn::backend::Autodiff<Inner>;

/// Simulator launch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("jad-sim"),
            args: Vec::new(),
        }
    }
}

/// PPO settings whose entropy schedule, when absent, follows the jad count.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PpoSection {
    #[serde(default)]
    pub entropy: Option<EntropySchedule>,
    #[serde(flatten)]
    pub settings: PPOConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub simulator: SimulatorConfig,
    /// Taken from JAD_COUNT / HEALERS_PER_JAD when absent
    pub jad: Option<JadConfig>,
    pub ppo: PpoSection,
    pub trainer: TrainerConfig,
    pub metrics_csv: Option<PathBuf>,
    /// Continue from the latest checkpoint
    pub resume: bool,
    pub eval_episodes: Option<usize>,
}

impl RunConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                Ok(serde_json::from_str(&text)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn jad(&self) -> Result<JadConfig, Box<dyn Error>> {
        match self.jad {
            Some(jad) => Ok(jad),
            None => Ok(JadConfig::from_env()?),
        }
    }

    pub fn ppo(&self, jad: &JadConfig) -> Result<PPOConfig, Box<dyn Error>> {
        let entropy = self
            .ppo
            .entropy
            .clone()
            .unwrap_or_else(|| EntropySchedule::for_jad_count(jad.jad_count()));
        Ok(self.ppo.settings.clone().with_entropy(entropy).build()?)
    }

    pub fn model(
        &self,
        jad: &JadConfig,
        ppo: &PPOConfig,
        device: &<B as burn::tensor::backend::Backend>::Device,
    ) -> Result<RecurrentActorCritic<B>, Box<dyn Error>> {
        let mut rng = match ppo.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let model = ModelConfig::from_ppo(observation_dim(jad), vec![action_count(jad)], ppo)
            .init::<B>(&mut rng, device)?;
        Ok(model)
    }

    pub fn envs(&self, jad: &JadConfig) -> Vec<ProcessEnv> {
        (0..self.trainer.n_envs)
            .map(|_| {
                ProcessEnv::new(
                    ProcessEnvConfig::new(self.simulator.program.clone())
                        .with_args(self.simulator.args.clone())
                        .with_jad(*jad)
                        .with_reward_function(self.trainer.reward.function),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_jads() -> JadConfig {
        JadConfig::new(2, 3).unwrap()
    }

    #[test]
    fn test_partial_ppo_section_keeps_jad_entropy_default() {
        let run: RunConfig = serde_json::from_str(r#"{"ppo": {"rollout_len": 64}}"#).unwrap();
        let ppo = run.ppo(&two_jads()).unwrap();

        assert_eq!(ppo.rollout_len, 64);
        assert_eq!(ppo.entropy, EntropySchedule::for_jad_count(2));
    }

    #[test]
    fn test_explicit_entropy_wins() {
        let run: RunConfig = serde_json::from_str(
            r#"{"ppo": {"seed": 3, "entropy": {"kind": "constant", "coef": 0.02}}}"#,
        )
        .unwrap();
        let ppo = run.ppo(&two_jads()).unwrap();

        assert_eq!(ppo.seed, Some(3));
        assert_eq!(ppo.entropy, EntropySchedule::constant(0.02));
    }

    #[test]
    fn test_missing_ppo_section() {
        let run = RunConfig::default();
        let ppo = run.ppo(&JadConfig::default()).unwrap();
        assert_eq!(ppo.entropy, EntropySchedule::constant(0.01));
        assert_eq!(ppo.rollout_len, PPOConfig::default().rollout_len);
    }
}
