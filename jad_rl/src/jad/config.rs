//! Fight configuration: number of jads and healers per jad.

use serde::{Deserialize, Serialize};

use crate::runners::ppo_config::ConfigError;

pub const MAX_JADS: usize = 6;
pub const MAX_HEALERS_PER_JAD: usize = 5;
/// Episode length cap per jad during training.
pub const BASE_EPISODE_LENGTH: usize = 300;

/// Entity counts for one fight.
///
/// Construction validates the ranges; an out-of-range count is an error,
/// never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawJadConfig", into = "RawJadConfig")]
pub struct JadConfig {
    jad_count: usize,
    healers_per_jad: usize,
}

#[derive(Serialize, Deserialize)]
struct RawJadConfig {
    #[serde(default = "default_jad_count")]
    jad_count: usize,
    #[serde(default = "default_healers")]
    healers_per_jad: usize,
}

fn default_jad_count() -> usize {
    1
}

fn default_healers() -> usize {
    3
}

impl TryFrom<RawJadConfig> for JadConfig {
    type Error = ConfigError;

    fn try_from(raw: RawJadConfig) -> Result<Self, Self::Error> {
        JadConfig::new(raw.jad_count, raw.healers_per_jad)
    }
}

impl From<JadConfig> for RawJadConfig {
    fn from(cfg: JadConfig) -> Self {
        Self {
            jad_count: cfg.jad_count,
            healers_per_jad: cfg.healers_per_jad,
        }
    }
}

impl Default for JadConfig {
    fn default() -> Self {
        Self {
            jad_count: default_jad_count(),
            healers_per_jad: default_healers(),
        }
    }
}

impl JadConfig {
    pub fn new(jad_count: usize, healers_per_jad: usize) -> Result<Self, ConfigError> {
        if !(1..=MAX_JADS).contains(&jad_count) {
            return Err(ConfigError::OutOfRange {
                field: "jad_count",
                value: jad_count as f64,
                min: 1.0,
                max: MAX_JADS as f64,
            });
        }
        if healers_per_jad > MAX_HEALERS_PER_JAD {
            return Err(ConfigError::OutOfRange {
                field: "healers_per_jad",
                value: healers_per_jad as f64,
                min: 0.0,
                max: MAX_HEALERS_PER_JAD as f64,
            });
        }
        Ok(Self {
            jad_count,
            healers_per_jad,
        })
    }

    /// Read `JAD_COUNT` (default 1) and `HEALERS_PER_JAD` (default 3).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jad_count = parse_count(&lookup, "JAD_COUNT", "jad_count", default_jad_count())?;
        let healers = parse_count(&lookup, "HEALERS_PER_JAD", "healers_per_jad", default_healers())?;
        Self::new(jad_count, healers)
    }

    pub fn jad_count(&self) -> usize {
        self.jad_count
    }

    pub fn healers_per_jad(&self) -> usize {
        self.healers_per_jad
    }

    /// Total healer slots across all jads.
    pub fn total_healers(&self) -> usize {
        self.jad_count * self.healers_per_jad
    }

    /// Training episode cap: `base_episode_length` steps per jad.
    pub fn max_episode_length(&self, base_episode_length: usize) -> usize {
        base_episode_length * self.jad_count
    }
}

fn parse_count<F>(
    lookup: &F,
    key: &str,
    field: &'static str,
    default: usize,
) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { field, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_bounds_are_enforced() {
        assert!(JadConfig::new(1, 0).is_ok());
        assert!(JadConfig::new(6, 5).is_ok());
        assert!(matches!(
            JadConfig::new(0, 3),
            Err(ConfigError::OutOfRange { field: "jad_count", .. })
        ));
        assert!(matches!(
            JadConfig::new(7, 3),
            Err(ConfigError::OutOfRange { field: "jad_count", .. })
        ));
        assert!(matches!(
            JadConfig::new(2, 6),
            Err(ConfigError::OutOfRange { field: "healers_per_jad", .. })
        ));
    }

    #[test]
    fn test_from_lookup_defaults_and_overrides() {
        let cfg = JadConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, JadConfig::default());
        assert_eq!((cfg.jad_count(), cfg.healers_per_jad()), (1, 3));

        let cfg = JadConfig::from_lookup(lookup(&[("JAD_COUNT", "3"), ("HEALERS_PER_JAD", " 2 ")]))
            .unwrap();
        assert_eq!(cfg.total_healers(), 6);
        assert_eq!(cfg.max_episode_length(BASE_EPISODE_LENGTH), 900);
    }

    #[test]
    fn test_from_lookup_rejects_garbage_and_range() {
        let err = JadConfig::from_lookup(lookup(&[("JAD_COUNT", "three")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Parse {
                field: "jad_count",
                value: "three".to_string()
            }
        );
        assert!(JadConfig::from_lookup(lookup(&[("HEALERS_PER_JAD", "9")])).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let cfg: JadConfig = serde_json::from_str(r#"{"jad_count": 2}"#).unwrap();
        assert_eq!((cfg.jad_count(), cfg.healers_per_jad()), (2, 3));
        assert!(serde_json::from_str::<JadConfig>(r#"{"jad_count": 9}"#).is_err());
    }
}
