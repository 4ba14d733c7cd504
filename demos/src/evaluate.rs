//! `jad evaluate`

use std::error::Error;
use std::path::Path;

use jad_rl::{create_optimizer, Checkpointer, PPOLearner, Trainer};

use crate::run_config::{RunConfig, B};

const DEFAULT_EPISODES: usize = 20;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let run = RunConfig::load(config_path)?;
    let jad = run.jad()?;
    let ppo = run.ppo(&jad)?;
    let Some(checkpoint) = run.trainer.checkpoint.clone() else {
        return Err("evaluate needs trainer.checkpoint.checkpoint_dir in the run file".into());
    };

    let device = Default::default();
    let checkpointer = Checkpointer::new(checkpoint)?;
    let (model, normalizer) = checkpointer.load_best::<B, _>(run.model(&jad, &ppo, &device)?, &device)?;

    let n_envs = run.trainer.n_envs;
    let learner = PPOLearner::new(model, create_optimizer(), ppo, n_envs, device);
    let mut trainer = Trainer::new(learner, run.envs(&jad), jad, run.trainer.clone())?;
    match &normalizer {
        Some(archive) => trainer.load_normalizer(archive)?,
        None => println!("No normalizer statistics next to the best model; using fresh ones"),
    }

    let episodes = run.eval_episodes.unwrap_or(DEFAULT_EPISODES);
    println!("=== Evaluating best model over {} episodes ===", episodes);
    let summary = trainer.evaluate(episodes)?;
    trainer.close()?;

    println!(
        "Win rate: {:.1}% ({}/{}) | Avg reward: {:.2} | Avg length: {:.1}",
        summary.win_rate() * 100.0,
        summary.wins,
        summary.episodes,
        summary.avg_reward,
        summary.avg_length
    );
    Ok(())
}
