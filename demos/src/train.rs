//! `jad train`

use std::error::Error;
use std::path::Path;

use jad_rl::{
    create_optimizer, observation_dim, Checkpointer, ConsoleLogger, CSVLogger, MultiLogger,
    PPOLearner, Trainer,
};

use crate::run_config::{RunConfig, B};

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let run = RunConfig::load(config_path)?;
    let jad = run.jad()?;
    let ppo = run.ppo(&jad)?;
    let trainer_config = run.trainer.clone();
    trainer_config.validate()?;

    println!("=== Recurrent PPO: Jad ===");
    println!(
        "Fight: {} jad(s) x {} healer(s), max episode length {}",
        jad.jad_count(),
        jad.healers_per_jad(),
        trainer_config.base_episode_length * jad.jad_count()
    );
    println!(
        "Envs: {} | Window: {} steps | Epochs: {} | LSTM: {} | obs_dim: {}",
        trainer_config.n_envs,
        ppo.rollout_len,
        ppo.update_epochs,
        ppo.lstm_hidden,
        observation_dim(&jad)
    );
    println!("Reward: {} ({:?})", trainer_config.reward.function.name(), trainer_config.reward.source);
    println!();

    let device = Default::default();
    let model = run.model(&jad, &ppo, &device)?;
    let learner = PPOLearner::new(model, create_optimizer(), ppo, trainer_config.n_envs, device);
    let mut trainer = Trainer::new(learner, run.envs(&jad), jad, trainer_config.clone())?;

    if run.resume {
        if let Some(checkpoint) = &trainer_config.checkpoint {
            let checkpointer = Checkpointer::new(checkpoint.clone())?;
            let device = trainer.learner().device().clone();
            let template = run.model(&jad, trainer.learner().config(), &device)?;
            let loaded = checkpointer.load_latest::<B, _, _>(template, create_optimizer(), &device)?;
            println!("Resuming from step {}", loaded.step);
            trainer.restore(loaded)?;
        } else {
            println!("resume requested but no checkpoint directory is configured");
        }
    }

    let mut logger = MultiLogger::new().add(ConsoleLogger::new(trainer_config.log_interval));
    if let Some(path) = &run.metrics_csv {
        logger = logger.add(CSVLogger::new(path)?);
    }

    let summary = trainer.train(&mut logger)?;
    trainer.close()?;

    println!();
    println!(
        "Done: {} updates, {} env steps, {} episodes, {} wins",
        summary.updates, summary.env_steps, summary.episodes, summary.wins
    );
    if let Some(best) = summary.best_avg_reward {
        println!("Best average episode reward: {:.2}", best);
    }
    Ok(())
}
