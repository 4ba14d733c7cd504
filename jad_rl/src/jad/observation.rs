//! Typed observations and their fixed-length encoding.
//!
//! The simulator reports a JSON object per tick. It is decoded once into
//! [`Observation`] (defaults applied at deserialization) and encoded into a
//! flat `f32` vector whose layout depends only on the [`JadConfig`]:
//!
//! ```text
//! [ continuous (9 + 3J + 3JH) | one-hot (1 + J + JH) + 4 + 4J + 3JH | binary 2 + J ]
//! ```
//!
//! Only the continuous prefix is normalized online.

use serde::{Deserialize, Serialize};

use super::config::JadConfig;
use crate::normalization::NormalizeMask;

pub const MAX_PLAYER_HP: f32 = 115.0;
pub const MAX_PRAYER: f32 = 99.0;
pub const MAX_STAT: f32 = 118.0;
pub const MAX_COORD: f32 = 26.0;
pub const MAX_JAD_HP: f32 = 350.0;
pub const MAX_HEALER_HP: f32 = 90.0;

/// 0 none, 1 mage, 2 range, 3 melee. Shared by prayers and jad attacks.
pub const PRAYER_CHOICES: usize = 4;
/// 0 not present, 1 jad, 2 player.
pub const HEALER_TARGET_CHOICES: usize = 3;

pub const HEALER_TARGET_JAD: i32 = 1;
pub const HEALER_TARGET_PLAYER: i32 = 2;

const PLAYER_CONTINUOUS: usize = 9;
const PER_ENTITY_CONTINUOUS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JadState {
    pub hp: i32,
    /// 0 none, 1 mage, 2 range, 3 melee
    pub attack: i32,
    pub x: i32,
    pub y: i32,
    pub alive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealerState {
    pub hp: i32,
    pub x: i32,
    pub y: i32,
    /// 0 not present, 1 jad, 2 player
    pub target: i32,
}

fn default_stat() -> i32 {
    99
}

fn default_starting_doses() -> i32 {
    4
}

/// One simulator tick as seen by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub player_hp: i32,
    pub player_prayer: i32,
    #[serde(default = "default_stat")]
    pub player_ranged: i32,
    #[serde(default = "default_stat")]
    pub player_defence: i32,
    #[serde(default)]
    pub player_location_x: i32,
    #[serde(default)]
    pub player_location_y: i32,
    /// 0 none, `1..=J` a jad, then healers in jad-major order
    #[serde(default)]
    pub player_target: i32,

    pub active_prayer: i32,
    #[serde(default)]
    pub rigour_active: bool,

    #[serde(default)]
    pub jads: Vec<JadState>,
    /// Flattened in jad-major order
    #[serde(default)]
    pub healers: Vec<HealerState>,
    #[serde(default)]
    pub healers_spawned: bool,

    #[serde(default)]
    pub bastion_doses: i32,
    #[serde(default)]
    pub sara_brew_doses: i32,
    #[serde(default)]
    pub super_restore_doses: i32,
    #[serde(default = "default_starting_doses")]
    pub starting_bastion_doses: i32,
    #[serde(default = "default_starting_doses")]
    pub starting_sara_brew_doses: i32,
    #[serde(default = "default_starting_doses")]
    pub starting_super_restore_doses: i32,
}

impl Observation {
    /// Total hp of the jads reported this tick.
    pub fn total_jad_hp(&self) -> i32 {
        self.jads.iter().map(|j| j.hp).sum()
    }

    /// True when jads are reported and every one is at or below zero hp.
    pub fn all_jads_dead(&self) -> bool {
        !self.jads.is_empty() && self.jads.iter().all(|j| j.hp <= 0)
    }
}

/// `value / divisor`, or 0 when the divisor is not positive.
pub fn safe_divide(value: f32, divisor: f32) -> f32 {
    if divisor <= 0.0 {
        0.0
    } else {
        value / divisor
    }
}

pub fn continuous_feature_count(cfg: &JadConfig) -> usize {
    PLAYER_CONTINUOUS
        + PER_ENTITY_CONTINUOUS * cfg.jad_count()
        + PER_ENTITY_CONTINUOUS * cfg.total_healers()
}

fn player_target_choices(cfg: &JadConfig) -> usize {
    1 + cfg.jad_count() + cfg.total_healers()
}

pub fn observation_dim(cfg: &JadConfig) -> usize {
    let one_hot = player_target_choices(cfg)
        + PRAYER_CHOICES
        + PRAYER_CHOICES * cfg.jad_count()
        + HEALER_TARGET_CHOICES * cfg.total_healers();
    let binary = 2 + cfg.jad_count();
    continuous_feature_count(cfg) + one_hot + binary
}

/// Mask selecting the continuous prefix.
pub fn normalize_mask(cfg: &JadConfig) -> NormalizeMask {
    NormalizeMask::prefix(observation_dim(cfg), continuous_feature_count(cfg))
}

fn push_one_hot(out: &mut Vec<f32>, index: i32, size: usize) {
    let start = out.len();
    out.resize(start + size, 0.0);
    if index >= 0 && (index as usize) < size {
        out[start + index as usize] = 1.0;
    }
}

/// Encode an observation for `cfg`. Missing jads or healers encode as zeros;
/// extra entries beyond the configured counts are ignored.
pub fn encode(obs: &Observation, cfg: &JadConfig) -> Vec<f32> {
    let n_jads = cfg.jad_count();
    let n_healers = cfg.total_healers();
    let jads = |i: usize| obs.jads.get(i);
    let healers = |i: usize| obs.healers.get(i);

    let mut out = Vec::with_capacity(observation_dim(cfg));

    out.extend_from_slice(&[
        obs.player_hp as f32 / MAX_PLAYER_HP,
        obs.player_prayer as f32 / MAX_PRAYER,
        obs.player_ranged as f32 / MAX_STAT,
        obs.player_defence as f32 / MAX_STAT,
        safe_divide(obs.bastion_doses as f32, obs.starting_bastion_doses as f32),
        safe_divide(obs.sara_brew_doses as f32, obs.starting_sara_brew_doses as f32),
        safe_divide(obs.super_restore_doses as f32, obs.starting_super_restore_doses as f32),
        obs.player_location_x as f32 / MAX_COORD,
        obs.player_location_y as f32 / MAX_COORD,
    ]);
    for i in 0..n_jads {
        match jads(i) {
            Some(j) => out.extend_from_slice(&[
                j.hp as f32 / MAX_JAD_HP,
                j.x as f32 / MAX_COORD,
                j.y as f32 / MAX_COORD,
            ]),
            None => out.extend_from_slice(&[0.0; PER_ENTITY_CONTINUOUS]),
        }
    }
    for i in 0..n_healers {
        match healers(i) {
            Some(h) => out.extend_from_slice(&[
                h.hp as f32 / MAX_HEALER_HP,
                h.x as f32 / MAX_COORD,
                h.y as f32 / MAX_COORD,
            ]),
            None => out.extend_from_slice(&[0.0; PER_ENTITY_CONTINUOUS]),
        }
    }

    push_one_hot(&mut out, obs.player_target, player_target_choices(cfg));
    push_one_hot(&mut out, obs.active_prayer, PRAYER_CHOICES);
    for i in 0..n_jads {
        let attack = jads(i).map_or(-1, |j| j.attack);
        push_one_hot(&mut out, attack, PRAYER_CHOICES);
    }
    for i in 0..n_healers {
        let target = healers(i).map_or(-1, |h| h.target);
        push_one_hot(&mut out, target, HEALER_TARGET_CHOICES);
    }

    out.push(obs.rigour_active as u8 as f32);
    out.push(obs.healers_spawned as u8 as f32);
    for i in 0..n_jads {
        out.push(jads(i).map_or(0.0, |j| j.alive as u8 as f32));
    }

    debug_assert_eq!(out.len(), observation_dim(cfg));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_observation() -> Observation {
        serde_json::from_str(
            r#"{
                "player_hp": 99,
                "player_prayer": 50,
                "active_prayer": 2,
                "player_target": 1,
                "player_location_x": 13,
                "rigour_active": true,
                "bastion_doses": 2,
                "jads": [{"hp": 175, "attack": 3, "x": 26, "y": 0, "alive": true}],
                "healers": [{"hp": 90, "x": 1, "y": 2, "target": 2}],
                "healers_spawned": true
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_dimensions_for_several_configs() {
        let single = JadConfig::new(1, 3).unwrap();
        assert_eq!(observation_dim(&single), 46);
        assert_eq!(continuous_feature_count(&single), 21);

        let bare = JadConfig::new(1, 0).unwrap();
        assert_eq!(continuous_feature_count(&bare), 12);
        assert_eq!(observation_dim(&bare), 12 + 2 + 4 + 4 + 3);

        let multi = JadConfig::new(3, 2).unwrap();
        assert_eq!(continuous_feature_count(&multi), 9 + 9 + 18);
        assert_eq!(observation_dim(&multi), 36 + 10 + 4 + 12 + 18 + 5);
    }

    #[test]
    fn test_mask_is_continuous_prefix() {
        let cfg = JadConfig::new(2, 3).unwrap();
        let flags = normalize_mask(&cfg).to_flags();
        assert_eq!(flags.len(), observation_dim(&cfg));
        let n = continuous_feature_count(&cfg);
        assert!(flags[..n].iter().all(|&f| f));
        assert!(flags[n..].iter().all(|&f| !f));
    }

    #[test]
    fn test_defaults_applied_once_at_decode() {
        let obs: Observation =
            serde_json::from_str(r#"{"player_hp": 1, "player_prayer": 2, "active_prayer": 0}"#)
                .unwrap();
        assert_eq!(obs.player_ranged, 99);
        assert_eq!(obs.player_defence, 99);
        assert_eq!(obs.starting_sara_brew_doses, 4);
        assert!(obs.jads.is_empty());
        assert!(!obs.healers_spawned);

        let jad: JadState = serde_json::from_str("{}").unwrap();
        assert_eq!(jad, JadState::default());
    }

    #[test]
    fn test_missing_required_field_is_an_error() {
        let missing = serde_json::from_str::<Observation>(r#"{"player_hp": 1, "player_prayer": 2}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_encode_single_jad_layout() {
        let cfg = JadConfig::new(1, 3).unwrap();
        let v = encode(&sample_observation(), &cfg);
        assert_eq!(v.len(), 46);

        assert!((v[0] - 99.0 / 115.0).abs() < 1e-6);
        assert!((v[1] - 50.0 / 99.0).abs() < 1e-6);
        assert!((v[2] - 99.0 / 118.0).abs() < 1e-6);
        assert!((v[4] - 0.5).abs() < 1e-6);
        assert_eq!(v[5], 0.0);
        assert!((v[7] - 0.5).abs() < 1e-6);
        // jad hp, x, y
        assert!((v[9] - 0.5).abs() < 1e-6);
        assert_eq!(v[10], 1.0);
        // first healer, then two absent healers
        assert_eq!(v[12], 1.0);
        assert!(v[15..21].iter().all(|&x| x == 0.0));

        // player target one-hot (5)
        assert_eq!(&v[21..26], &[0.0, 1.0, 0.0, 0.0, 0.0]);
        // active prayer (4)
        assert_eq!(&v[26..30], &[0.0, 0.0, 1.0, 0.0]);
        // jad attack (4)
        assert_eq!(&v[30..34], &[0.0, 0.0, 0.0, 1.0]);
        // healer targets (3 each); absent healers stay all-zero
        assert_eq!(&v[34..37], &[0.0, 0.0, 1.0]);
        assert!(v[37..43].iter().all(|&x| x == 0.0));
        // rigour, healers spawned, jad alive
        assert_eq!(&v[43..46], &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_zero_starting_doses_encode_as_zero() {
        let mut obs = sample_observation();
        obs.starting_bastion_doses = 0;
        let v = encode(&obs, &JadConfig::new(1, 3).unwrap());
        assert_eq!(v[4], 0.0);
        assert_eq!(safe_divide(3.0, -1.0), 0.0);
    }

    #[test]
    fn test_missing_jads_encode_as_zeros() {
        let cfg = JadConfig::new(2, 0).unwrap();
        let v = encode(&sample_observation(), &cfg);
        assert_eq!(v.len(), observation_dim(&cfg));
        // second jad's continuous block
        assert!(v[12..15].iter().all(|&x| x == 0.0));
        // second jad alive flag is the last entry
        assert_eq!(v[v.len() - 1], 0.0);
        assert_eq!(v[v.len() - 2], 1.0);
    }

    #[test]
    fn test_all_jads_dead() {
        let mut obs = sample_observation();
        assert!(!obs.all_jads_dead());
        obs.jads[0].hp = 0;
        assert!(obs.all_jads_dead());
        obs.jads.clear();
        assert!(!obs.all_jads_dead());
    }
}
