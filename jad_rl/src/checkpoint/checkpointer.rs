//! Training checkpoints.
//!
//! Each checkpoint is a set of files sharing the stem `checkpoint_{step:08}`:
//!
//! - `.bin`: model record
//! - `.optim.bin`: optimizer record
//! - `.norm.bin`: normalizer archive
//!
//! The best model by average episode reward is mirrored to `best.bin`
//! (and `best.norm.bin`). Older checkpoints beyond `keep_last_n` are removed.

use burn::module::{AutodiffModule, Module};
use burn::optim::Optimizer;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::normalization::{ArchiveError, NormalizerArchive};

const PREFIX: &str = "checkpoint_";
const BEST_STEM: &str = "best";

/// Configuration for the checkpointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointerConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Env steps between checkpoint saves.
    pub save_interval: usize,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
    /// Whether to track and save the best model.
    pub save_best: bool,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_interval: 10_000,
            keep_last_n: 5,
            save_best: true,
        }
    }
}

impl CheckpointerConfig {
    /// Create a new config with specified checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set the save interval.
    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    /// Set the number of checkpoints to keep.
    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    /// Enable or disable best model tracking.
    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    /// IO error during save/load.
    Io(io::Error),
    /// Burn recorder error.
    Recorder(String),
    /// Normalizer archive could not be written or read.
    Archive(ArchiveError),
    /// No checkpoints found.
    NoCheckpoints,
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "Recorder error: {}", e),
            CheckpointError::Archive(e) => write!(f, "Normalizer archive error: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "No checkpoints found"),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

impl From<ArchiveError> for CheckpointError {
    fn from(e: ArchiveError) -> Self {
        CheckpointError::Archive(e)
    }
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInfo {
    /// Path to the model file.
    pub path: PathBuf,
    /// Env step at which the checkpoint was saved.
    pub step: usize,
    /// Optional metric value (e.g., reward).
    pub metric: Option<f32>,
}

impl CheckpointInfo {
    pub fn optimizer_path(&self) -> PathBuf {
        sibling(&self.path, "optim.bin")
    }

    pub fn normalizer_path(&self) -> PathBuf {
        sibling(&self.path, "norm.bin")
    }
}

/// `dir/stem.bin` -> `dir/stem.{suffix}`
fn sibling(model_path: &Path, suffix: &str) -> PathBuf {
    let stem = model_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    model_path.with_file_name(format!("{}.{}", stem, suffix))
}

/// Step encoded in a model file name, `None` for anything else
/// (including the optimizer and normalizer siblings).
fn parse_step(filename: &str) -> Option<usize> {
    filename
        .strip_prefix(PREFIX)?
        .strip_suffix(".bin")?
        .parse()
        .ok()
}

/// Everything restored from one checkpoint.
pub struct LoadedCheckpoint<M, O> {
    pub model: M,
    pub optimizer: O,
    pub normalizer: Option<NormalizerArchive>,
    pub step: usize,
}

/// Training checkpointer.
///
/// Handles saving model, optimizer and normalizer state at regular
/// intervals, tracking the best model, and cleaning up old checkpoints.
pub struct Checkpointer {
    config: CheckpointerConfig,
    best_metric: f32,
    last_saved_step: Option<usize>,
    checkpoint_history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Create a new checkpointer.
    ///
    /// Creates the checkpoint directory if it doesn't exist.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;

        Ok(Self {
            config,
            best_metric: f32::NEG_INFINITY,
            last_saved_step: None,
            checkpoint_history: Vec::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// True once `save_interval` env steps have passed since the last save.
    pub fn should_save(&self, step: usize) -> bool {
        if step == 0 {
            return false;
        }
        let last = self.last_saved_step.unwrap_or(0);
        step >= last + self.config.save_interval.max(1)
    }

    fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
        BinFileRecorder::<FullPrecisionSettings>::new()
    }

    fn save_model<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<(), CheckpointError> {
        model
            .clone()
            .save_file(path.to_path_buf(), &Self::recorder())
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Save a checkpoint.
    ///
    /// # Arguments
    ///
    /// * `model` - The model to save
    /// * `optimizer` - Its optimizer state
    /// * `normalizer` - Observation and return statistics
    /// * `step` - Env steps so far
    /// * `metric` - Optional metric value (e.g., average episode reward)
    pub fn save<B, M, O>(
        &mut self,
        model: &M,
        optimizer: &O,
        normalizer: &NormalizerArchive,
        step: usize,
        metric: Option<f32>,
    ) -> Result<PathBuf, CheckpointError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let path = self
            .config
            .checkpoint_dir
            .join(format!("{}{:08}.bin", PREFIX, step));
        let info = CheckpointInfo {
            path: path.clone(),
            step,
            metric,
        };

        Self::save_model(model, &path)?;
        Recorder::<B>::record(&Self::recorder(), optimizer.to_record(), info.optimizer_path())
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        normalizer.save(info.normalizer_path())?;

        self.checkpoint_history.push(info);
        self.last_saved_step = Some(step);

        if self.config.save_best {
            if let Some(m) = metric {
                if m > self.best_metric {
                    self.best_metric = m;
                    let best_path = self.best_path();
                    Self::save_model(model, &best_path)?;
                    normalizer.save(sibling(&best_path, "norm.bin"))?;
                    log::info!("new best model at step {} (metric {:.3})", step, m);
                }
            }
        }

        self.cleanup_old_checkpoints();
        log::debug!("saved checkpoint {}", path.display());
        Ok(path)
    }

    /// Load a model from a checkpoint file.
    ///
    /// `model_template` provides the architecture; its weights are replaced.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        model_template
            .load_file(path.to_path_buf(), &Self::recorder(), device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Restore an optimizer saved next to `info`'s model file.
    pub fn load_optimizer<B, M, O>(
        &self,
        optimizer: O,
        info: &CheckpointInfo,
        device: &B::Device,
    ) -> Result<O, CheckpointError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let record = Recorder::<B>::load(&Self::recorder(), info.optimizer_path(), device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        Ok(optimizer.load_record(record))
    }

    /// Normalizer archive saved next to `model_path`, if one exists.
    pub fn load_normalizer(
        &self,
        model_path: &Path,
    ) -> Result<Option<NormalizerArchive>, CheckpointError> {
        let path = sibling(model_path, "norm.bin");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(NormalizerArchive::load(path)?))
    }

    fn best_path(&self) -> PathBuf {
        self.config.checkpoint_dir.join(format!("{}.bin", BEST_STEM))
    }

    /// Load the best model and its normalizer.
    pub fn load_best<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        device: &B::Device,
    ) -> Result<(M, Option<NormalizerArchive>), CheckpointError> {
        let best_path = self.best_path();
        if !best_path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        let model = self.load(model_template, &best_path, device)?;
        Ok((model, self.load_normalizer(&best_path)?))
    }

    /// Load the latest checkpoint: model, optimizer and normalizer.
    pub fn load_latest<B, M, O>(
        &self,
        model_template: M,
        optimizer: O,
        device: &B::Device,
    ) -> Result<LoadedCheckpoint<M, O>, CheckpointError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let latest = self.find_latest_checkpoint()?;
        let model = self.load(model_template, &latest.path, device)?;
        let optimizer = self.load_optimizer::<B, M, O>(optimizer, &latest, device)?;
        let normalizer = self.load_normalizer(&latest.path)?;
        Ok(LoadedCheckpoint {
            model,
            optimizer,
            normalizer,
            step: latest.step,
        })
    }

    /// Find the latest checkpoint in the checkpoint directory.
    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        self.list_checkpoints()?
            .pop()
            .ok_or(CheckpointError::NoCheckpoints)
    }

    /// List all checkpoints in the directory, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let step = parse_step(path.file_name()?.to_str()?)?;
                Some(CheckpointInfo {
                    path,
                    step,
                    metric: None,
                })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    /// Get the current best metric value.
    pub fn best_metric(&self) -> f32 {
        self.best_metric
    }

    /// Cleanup old checkpoints, keeping only the last N.
    fn cleanup_old_checkpoints(&mut self) {
        if self.config.keep_last_n == 0 {
            return;
        }

        while self.checkpoint_history.len() > self.config.keep_last_n {
            let old = self.checkpoint_history.remove(0);
            for path in [old.optimizer_path(), old.normalizer_path(), old.path] {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}
