//! Selective observation and reward normalization over N parallel environments.
//!
//! Only the continuous prefix of each observation vector is normalized; the
//! one-hot and binary tail is passed through bit-for-bit. Rewards are scaled
//! by the running standard deviation of each environment's discounted return
//! (no mean subtraction, so the sign of a reward is preserved).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::archive::{ArchiveError, NormalizerArchive, OBS_MEAN, RET_MEAN};
use crate::core::running_stats::{RunningNormalizer, DEFAULT_EPSILON};

/// Error raised when a mask is not a contiguous `true` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskError {
    /// First `true` entry found after a `false` entry.
    pub index: usize,
}

impl fmt::Display for MaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "normalize mask must be a contiguous prefix, found true at index {} after a false",
            self.index
        )
    }
}

impl std::error::Error for MaskError {}

/// Which observation positions are normalized.
///
/// Always a contiguous prefix of `true` entries followed by `false` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeMask {
    len: usize,
    prefix: usize,
}

impl NormalizeMask {
    /// Mask of length `len` whose first `prefix` entries are normalized.
    ///
    /// # Panics
    /// Panics if `prefix > len`.
    pub fn prefix(len: usize, prefix: usize) -> Self {
        assert!(prefix <= len, "prefix {} exceeds mask length {}", prefix, len);
        Self { len, prefix }
    }

    /// Build from explicit flags, rejecting anything but a contiguous prefix.
    pub fn from_flags(flags: &[bool]) -> Result<Self, MaskError> {
        let prefix = flags.iter().take_while(|&&f| f).count();
        if let Some(offset) = flags[prefix..].iter().position(|&f| f) {
            return Err(MaskError {
                index: prefix + offset,
            });
        }
        Ok(Self {
            len: flags.len(),
            prefix,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of normalized (continuous) positions.
    pub fn n_selected(&self) -> usize {
        self.prefix
    }

    pub fn is_selected(&self, i: usize) -> bool {
        i < self.prefix
    }

    pub fn to_flags(&self) -> Vec<bool> {
        (0..self.len).map(|i| i < self.prefix).collect()
    }
}

/// Settings for [`SelectiveNormalizationLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Update running statistics while normalizing.
    pub training: bool,
    pub norm_obs: bool,
    pub norm_reward: bool,
    pub clip_obs: f32,
    pub clip_reward: f32,
    /// Discount used for the running return.
    pub gamma: f64,
    pub epsilon: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            training: true,
            norm_obs: true,
            norm_reward: true,
            clip_obs: 10.0,
            clip_reward: 10.0,
            gamma: 0.99,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl NormalizationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    pub fn with_norm_obs(mut self, enabled: bool) -> Self {
        self.norm_obs = enabled;
        self
    }

    pub fn with_norm_reward(mut self, enabled: bool) -> Self {
        self.norm_reward = enabled;
        self
    }

    pub fn with_clip_obs(mut self, clip: f32) -> Self {
        self.clip_obs = clip;
        self
    }

    pub fn with_clip_reward(mut self, clip: f32) -> Self {
        self.clip_reward = clip;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Normalization layer shared by N parallel environments.
///
/// One observation normalizer is fed by all environments; one scalar
/// normalizer tracks the variance of the per-environment discounted returns.
#[derive(Debug, Clone)]
pub struct SelectiveNormalizationLayer {
    config: NormalizationConfig,
    mask: NormalizeMask,
    obs_stats: RunningNormalizer,
    ret_stats: RunningNormalizer,
    returns: Vec<f64>,
}

impl SelectiveNormalizationLayer {
    pub fn new(mask: NormalizeMask, n_envs: usize, config: NormalizationConfig) -> Self {
        Self {
            obs_stats: RunningNormalizer::with_epsilon(mask.n_selected(), config.epsilon),
            ret_stats: RunningNormalizer::with_epsilon(1, config.epsilon),
            returns: vec![0.0; n_envs],
            mask,
            config,
        }
    }

    pub fn n_envs(&self) -> usize {
        self.returns.len()
    }

    pub fn obs_dim(&self) -> usize {
        self.mask.len()
    }

    pub fn mask(&self) -> &NormalizeMask {
        &self.mask
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    pub fn is_training(&self) -> bool {
        self.config.training
    }

    pub fn set_training(&mut self, training: bool) {
        self.config.training = training;
    }

    pub fn obs_stats(&self) -> &RunningNormalizer {
        &self.obs_stats
    }

    pub fn ret_stats(&self) -> &RunningNormalizer {
        &self.ret_stats
    }

    /// Current discounted running return per environment.
    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Zero every environment's running return.
    pub fn reset(&mut self) {
        self.returns.fill(0.0);
    }

    /// Normalize a row-major `[n_envs * obs_dim]` batch of observations.
    ///
    /// Updates the observation statistics with all rows when training.
    pub fn normalize_observations(&mut self, batch: &[f32]) -> Vec<f32> {
        let dim = self.obs_dim();
        assert_eq!(
            batch.len(),
            self.n_envs() * dim,
            "observation batch must hold n_envs * obs_dim values"
        );
        if !self.config.norm_obs || self.mask.n_selected() == 0 {
            return batch.to_vec();
        }

        let k = self.mask.n_selected();
        if self.config.training {
            let selected: Vec<f64> = batch
                .chunks_exact(dim)
                .flat_map(|row| row[..k].iter().map(|&x| x as f64))
                .collect();
            self.obs_stats.update(&selected);
        }

        let mut out = batch.to_vec();
        for row in out.chunks_exact_mut(dim) {
            self.normalize_prefix(&mut row[..k]);
        }
        out
    }

    fn normalize_prefix(&self, values: &mut [f32]) {
        let clip = self.config.clip_obs;
        let mean = self.obs_stats.mean();
        for (i, x) in values.iter_mut().enumerate() {
            let z = (*x as f64 - mean[i]) / self.obs_stats.scale(i);
            *x = (z as f32).clamp(-clip, clip);
        }
    }

    /// Scale one reward per environment by the running return deviation.
    ///
    /// Running returns of environments flagged in `dones` are zeroed after the
    /// rewards have been scaled.
    pub fn normalize_rewards(&mut self, rewards: &[f32], dones: &[bool]) -> Vec<f32> {
        assert_eq!(rewards.len(), self.n_envs(), "one reward per environment");
        assert_eq!(dones.len(), self.n_envs(), "one done flag per environment");
        if !self.config.norm_reward {
            return rewards.to_vec();
        }

        let gamma = self.config.gamma;
        for (ret, &r) in self.returns.iter_mut().zip(rewards) {
            *ret = *ret * gamma + r as f64;
        }
        if self.config.training {
            self.ret_stats.update(&self.returns);
        }

        let scale = self.ret_stats.scale(0);
        let clip = self.config.clip_reward;
        let out = rewards
            .iter()
            .map(|&r| ((r as f64 / scale) as f32).clamp(-clip, clip))
            .collect();

        for (ret, &done) in self.returns.iter_mut().zip(dones) {
            if done {
                *ret = 0.0;
            }
        }
        out
    }

    /// Snapshot both normalizers as a named-array archive.
    pub fn to_archive(&self) -> NormalizerArchive {
        NormalizerArchive::from_stats(&self.obs_stats, &self.ret_stats)
    }

    /// Restore both normalizers from an archive.
    pub fn load_archive(&mut self, archive: &NormalizerArchive) -> Result<(), ArchiveError> {
        let (mut obs, mut ret) = archive.to_stats()?;
        if obs.dim() != self.obs_stats.dim() {
            return Err(ArchiveError::BadField {
                name: OBS_MEAN.to_string(),
                reason: format!("expected {} entries, found {}", self.obs_stats.dim(), obs.dim()),
            });
        }
        if ret.dim() != 1 {
            return Err(ArchiveError::BadField {
                name: RET_MEAN.to_string(),
                reason: format!("expected 1 entry, found {}", ret.dim()),
            });
        }
        obs.set_epsilon(self.config.epsilon);
        ret.set_epsilon(self.config.epsilon);
        self.obs_stats = obs;
        self.ret_stats = ret;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(obs_dim: usize, prefix: usize, n_envs: usize) -> SelectiveNormalizationLayer {
        SelectiveNormalizationLayer::new(
            NormalizeMask::prefix(obs_dim, prefix),
            n_envs,
            NormalizationConfig::default(),
        )
    }

    #[test]
    fn test_mask_prefix_invariant() {
        let mask = NormalizeMask::from_flags(&[true, true, false, false]).unwrap();
        assert_eq!(mask.n_selected(), 2);
        assert_eq!(mask.to_flags(), vec![true, true, false, false]);

        let err = NormalizeMask::from_flags(&[true, false, true]).unwrap_err();
        assert_eq!(err.index, 2);

        let none = NormalizeMask::from_flags(&[false, false]).unwrap();
        assert_eq!(none.n_selected(), 0);
    }

    #[test]
    fn test_masked_out_positions_are_bit_identical() {
        let mut layer = layer(6, 3, 2);
        let mut rng = fastrand::Rng::with_seed(3);

        for _ in 0..50 {
            let batch: Vec<f32> = (0..12)
                .map(|i| {
                    if i % 6 < 3 {
                        rng.f32() * 40.0 - 20.0
                    } else {
                        // odd bit patterns that arithmetic would disturb
                        [0.0, 1.0, -0.0, f32::MIN_POSITIVE, 1e-40][rng.usize(0..5)]
                    }
                })
                .collect();
            let out = layer.normalize_observations(&batch);
            for row in 0..2 {
                for i in 3..6 {
                    let idx = row * 6 + i;
                    assert_eq!(out[idx].to_bits(), batch[idx].to_bits());
                }
            }
        }
    }

    #[test]
    fn test_continuous_prefix_is_normalized_and_clipped() {
        let mut layer = layer(2, 1, 1);
        for i in 0..1000 {
            layer.normalize_observations(&[(i % 2) as f32, 7.0]);
        }
        // mean 0.5, var 0.25: 0.5 std above the mean is z = 1
        layer.set_training(false);
        let out = layer.normalize_observations(&[1.0, 7.0]);
        assert!((out[0] - 1.0).abs() < 1e-3);
        assert_eq!(out[1], 7.0);

        let far = layer.normalize_observations(&[1e6, 7.0]);
        assert_eq!(far[0], 10.0);
    }

    #[test]
    fn test_eval_mode_leaves_stats_untouched() {
        let mut layer = layer(3, 2, 1);
        layer.normalize_observations(&[1.0, 2.0, 0.0]);
        let before = layer.obs_stats().clone();

        layer.set_training(false);
        layer.normalize_observations(&[100.0, 200.0, 1.0]);
        assert_eq!(layer.obs_stats(), &before);
    }

    #[test]
    fn test_reward_scaled_by_return_variance_and_reset_on_done() {
        let mut layer = layer(1, 1, 2);

        let out = layer.normalize_rewards(&[1.0, 2.0], &[false, true]);
        // returns [1, 2]: var 0.25, so rewards are divided by 0.5
        assert!((out[0] - 2.0).abs() < 1e-4);
        assert!((out[1] - 4.0).abs() < 1e-4);
        assert_eq!(layer.returns(), &[1.0, 0.0]);

        layer.normalize_rewards(&[1.0, 1.0], &[false, false]);
        assert!((layer.returns()[0] - 1.99).abs() < 1e-12);
        assert!((layer.returns()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reward_sign_preserved_and_clipped() {
        let mut layer = SelectiveNormalizationLayer::new(
            NormalizeMask::prefix(1, 1),
            1,
            NormalizationConfig::default().with_clip_reward(0.5),
        );
        for _ in 0..10 {
            let out = layer.normalize_rewards(&[0.01], &[false]);
            assert!(out[0] > 0.0);
        }
        // the large reward also inflates the return variance, leaving
        // about -3.5 before the clip
        let out = layer.normalize_rewards(&[-1000.0], &[false]);
        assert_eq!(out[0], -0.5);
    }

    #[test]
    fn test_disabled_paths_pass_through() {
        let mut layer = SelectiveNormalizationLayer::new(
            NormalizeMask::prefix(2, 2),
            1,
            NormalizationConfig::default()
                .with_norm_obs(false)
                .with_norm_reward(false),
        );
        assert_eq!(layer.normalize_observations(&[3.0, 4.0]), vec![3.0, 4.0]);
        assert_eq!(layer.normalize_rewards(&[9.0], &[true]), vec![9.0]);
        assert_eq!(layer.obs_stats().count(), 0);
    }

    #[test]
    fn test_archive_round_trip_restores_layer() {
        let mut a = layer(4, 2, 2);
        a.normalize_observations(&[1.0, 2.0, 0.0, 1.0, 3.0, 5.0, 1.0, 0.0]);
        a.normalize_rewards(&[0.5, -0.25], &[false, false]);

        let mut b = layer(4, 2, 2);
        b.load_archive(&a.to_archive()).unwrap();
        assert_eq!(a.obs_stats(), b.obs_stats());
        assert_eq!(a.ret_stats(), b.ret_stats());

        let mut wrong = layer(5, 3, 2);
        assert!(wrong.load_archive(&a.to_archive()).is_err());
    }

    #[test]
    fn test_archive_restore_keeps_configured_epsilon() {
        let config = NormalizationConfig::default().with_epsilon(0.5);
        let mut a = SelectiveNormalizationLayer::new(NormalizeMask::prefix(1, 1), 1, config.clone());
        for i in 0..1000 {
            a.normalize_observations(&[(i % 2) as f32]);
        }
        a.set_training(false);
        // mean 0.5, var 0.25: 0.5 / sqrt(0.25 + 0.5)
        let expected = a.normalize_observations(&[1.0])[0];
        assert!((expected - 0.577).abs() < 1e-3);

        let mut b = SelectiveNormalizationLayer::new(NormalizeMask::prefix(1, 1), 1, config);
        b.load_archive(&a.to_archive()).unwrap();
        b.set_training(false);
        assert_eq!(b.obs_stats().epsilon(), 0.5);
        assert_eq!(b.ret_stats().epsilon(), 0.5);
        assert_eq!(b.normalize_observations(&[1.0])[0], expected);
    }
}
