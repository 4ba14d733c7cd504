//! Training progress loggers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::learner::UpdateStats;

/// Training snapshot for logging, taken after each update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSnapshot {
    /// Updates completed.
    pub update: usize,
    /// Total environment steps.
    pub env_steps: usize,
    /// Number of completed episodes.
    pub episodes: usize,
    /// Episodes ending with every jad dead.
    pub wins: usize,
    /// Average raw episode reward over recent episodes.
    pub avg_reward: f32,
    /// Average episode length over recent episodes.
    pub avg_episode_len: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub entropy_coef: f32,
    pub approx_kl: f32,
    pub clip_fraction: f32,
    /// Global gradient norm before clipping.
    pub gradient_norm: f32,
    pub learning_rate: f64,
}

impl TrainingSnapshot {
    /// Create a new training snapshot.
    pub fn new(update: usize, env_steps: usize, episodes: usize, avg_reward: f32) -> Self {
        Self {
            update,
            env_steps,
            episodes,
            avg_reward,
            ..Default::default()
        }
    }

    /// Copy losses and diagnostics from an update.
    pub fn with_update_stats(mut self, stats: &UpdateStats) -> Self {
        self.policy_loss = stats.policy_loss;
        self.value_loss = stats.value_loss;
        self.entropy = stats.entropy;
        self.approx_kl = stats.approx_kl;
        self.clip_fraction = stats.clip_fraction;
        self.gradient_norm = stats.grad_norm;
        self
    }

    pub fn with_wins(mut self, wins: usize) -> Self {
        self.wins = wins;
        self
    }

    pub fn with_avg_episode_len(mut self, len: f32) -> Self {
        self.avg_episode_len = len;
        self
    }

    pub fn with_entropy_coef(mut self, coef: f32) -> Self {
        self.entropy_coef = coef;
        self
    }

    /// Set learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Fraction of finished episodes that were wins.
    pub fn win_rate(&self) -> f32 {
        if self.episodes == 0 {
            0.0
        } else {
            self.wins as f32 / self.episodes as f32
        }
    }
}

/// Logger trait for different logging backends.
pub trait MetricsLogger {
    /// Log a training snapshot.
    fn log(&mut self, snapshot: &TrainingSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

fn steps_per_second(env_steps: usize, start: Instant) -> f32 {
    let elapsed = start.elapsed().as_secs_f32();
    if elapsed > 0.0 {
        env_steps as f32 / elapsed
    } else {
        0.0
    }
}

/// Console table, one row every `log_interval` updates.
pub struct ConsoleLogger {
    log_interval: usize,
    last_logged: Option<usize>,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a new console logger.
    ///
    /// # Arguments
    ///
    /// * `log_interval` - Updates between log rows
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            last_logged: None,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }

    fn due(&self, update: usize) -> bool {
        match self.last_logged {
            None => true,
            Some(last) => update >= last + self.log_interval,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>7} {:>10} {:>8} {:>6} {:>9} {:>7} {:>9} {:>9} {:>8} {:>7} {:>8} {:>7}",
            "Update", "EnvSteps", "Episodes", "Win%", "Reward", "EpLen", "Policy", "Value",
            "Entropy", "KL", "GradNorm", "SPS"
        );
        println!("{}", "-".repeat(107));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        if !self.due(snapshot.update) {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        println!(
            "{:>7} {:>10} {:>8} {:>6.1} {:>9.2} {:>7.1} {:>9.4} {:>9.4} {:>8.4} {:>7.4} {:>8.3} {:>7.0}",
            snapshot.update,
            snapshot.env_steps,
            snapshot.episodes,
            snapshot.win_rate() * 100.0,
            snapshot.avg_reward,
            snapshot.avg_episode_len,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            snapshot.approx_kl,
            snapshot.gradient_norm,
            steps_per_second(snapshot.env_steps, self.start_time)
        );

        self.last_logged = Some(snapshot.update);
    }

    fn flush(&mut self) {
        // stdout is line-buffered
    }
}

/// CSV file logger for analysis.
pub struct CSVLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CSVLogger {
    pub const HEADER: &'static str = "update,env_steps,episodes,wins,avg_reward,avg_episode_len,\
policy_loss,value_loss,entropy,entropy_coef,approx_kl,clip_fraction,gradient_norm,learning_rate,\
elapsed_secs,sps";

    /// Create a new CSV logger, truncating `path`.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", Self::HEADER)?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let written = writeln!(
            self.writer,
            "{},{},{},{},{:.4},{:.2},{:.6},{:.6},{:.6},{:.6},{:.6},{:.4},{:.6},{:.8},{:.2},{:.2}",
            snapshot.update,
            snapshot.env_steps,
            snapshot.episodes,
            snapshot.wins,
            snapshot.avg_reward,
            snapshot.avg_episode_len,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            snapshot.entropy_coef,
            snapshot.approx_kl,
            snapshot.clip_fraction,
            snapshot.gradient_norm,
            snapshot.learning_rate,
            elapsed,
            steps_per_second(snapshot.env_steps, self.start_time)
        );
        if let Err(e) = written {
            log::warn!("failed to write metrics row: {}", e);
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    /// Create a new multi-logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}
