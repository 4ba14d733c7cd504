//! Named-array archive for normalizer statistics.
//!
//! Layout (little-endian):
//!
//! ```text
//! magic    8 bytes  b"JADNORM1"
//! n_fields u32
//! field    u16 name_len | name (utf-8) | u8 kind | u64 len | len * 8 bytes
//! ```
//!
//! `kind` is 0 for `f64` arrays and 1 for `u64` arrays. Counts are stored as
//! one-element `u64` arrays so they survive exactly.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::core::running_stats::{RunningNormalizer, StatsError};

const MAGIC: &[u8; 8] = b"JADNORM1";

pub const OBS_MEAN: &str = "obs_mean";
pub const OBS_VAR: &str = "obs_var";
pub const OBS_COUNT: &str = "obs_count";
pub const RET_MEAN: &str = "ret_mean";
pub const RET_VAR: &str = "ret_var";
pub const RET_COUNT: &str = "ret_count";

/// Errors reading or writing an archive.
#[derive(Debug)]
pub enum ArchiveError {
    Io(io::Error),
    BadMagic,
    Truncated { needed: usize, available: usize },
    MissingField(String),
    /// Field present with the wrong element type or length.
    BadField { name: String, reason: String },
    InvalidStats(StatsError),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Io(e) => write!(f, "archive io error: {}", e),
            ArchiveError::BadMagic => write!(f, "not a normalizer archive (bad magic)"),
            ArchiveError::Truncated { needed, available } => write!(
                f,
                "archive truncated: needed {} bytes, {} available",
                needed, available
            ),
            ArchiveError::MissingField(name) => write!(f, "archive is missing field '{}'", name),
            ArchiveError::BadField { name, reason } => {
                write!(f, "archive field '{}' is invalid: {}", name, reason)
            }
            ArchiveError::InvalidStats(e) => write!(f, "archive holds invalid statistics: {}", e),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::Io(e) => Some(e),
            ArchiveError::InvalidStats(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(e: io::Error) -> Self {
        ArchiveError::Io(e)
    }
}

impl From<StatsError> for ArchiveError {
    fn from(e: StatsError) -> Self {
        ArchiveError::InvalidStats(e)
    }
}

/// One named array.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveValue {
    F64(Vec<f64>),
    U64(Vec<u64>),
}

impl ArchiveValue {
    fn kind(&self) -> u8 {
        match self {
            ArchiveValue::F64(_) => 0,
            ArchiveValue::U64(_) => 1,
        }
    }

    fn len(&self) -> usize {
        match self {
            ArchiveValue::F64(v) => v.len(),
            ArchiveValue::U64(v) => v.len(),
        }
    }
}

/// Collection of named arrays holding the observation and return statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizerArchive {
    fields: BTreeMap<String, ArchiveValue>,
}

impl NormalizerArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stats(obs: &RunningNormalizer, ret: &RunningNormalizer) -> Self {
        let mut archive = Self::new();
        archive.insert(OBS_MEAN, ArchiveValue::F64(obs.mean().to_vec()));
        archive.insert(OBS_VAR, ArchiveValue::F64(obs.var().to_vec()));
        archive.insert(OBS_COUNT, ArchiveValue::U64(vec![obs.count()]));
        archive.insert(RET_MEAN, ArchiveValue::F64(ret.mean().to_vec()));
        archive.insert(RET_VAR, ArchiveValue::F64(ret.var().to_vec()));
        archive.insert(RET_COUNT, ArchiveValue::U64(vec![ret.count()]));
        archive
    }

    /// Rebuild `(observation, return)` statistics.
    pub fn to_stats(&self) -> Result<(RunningNormalizer, RunningNormalizer), StatsError> {
        // Missing fields were rejected by `from_bytes`; archives built in
        // memory go through `from_stats`, so shape checks suffice here.
        let f = |name: &str| match self.fields.get(name) {
            Some(ArchiveValue::F64(v)) => v.clone(),
            _ => Vec::new(),
        };
        let c = |name: &str| match self.fields.get(name) {
            Some(ArchiveValue::U64(v)) => v.first().copied().unwrap_or(0),
            _ => 0,
        };
        let obs = RunningNormalizer::from_parts(f(OBS_MEAN), f(OBS_VAR), c(OBS_COUNT))?;
        let ret = RunningNormalizer::from_parts(f(RET_MEAN), f(RET_VAR), c(RET_COUNT))?;
        Ok((obs, ret))
    }

    pub fn insert(&mut self, name: &str, value: ArchiveValue) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveValue> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.fields.len() as u32).to_le_bytes());
        for (name, value) in &self.fields {
            bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(value.kind());
            bytes.extend_from_slice(&(value.len() as u64).to_le_bytes());
            match value {
                ArchiveValue::F64(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
                ArchiveValue::U64(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
            }
        }
        bytes
    }

    /// Parse an archive, requiring all six statistics fields.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut reader = Reader { bytes, offset: 0 };
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(ArchiveError::BadMagic);
        }

        let n_fields = u32::from_le_bytes(reader.array()?);
        let mut archive = Self::new();
        for _ in 0..n_fields {
            let name_len = u16::from_le_bytes(reader.array()?) as usize;
            let name = String::from_utf8(reader.take(name_len)?.to_vec()).map_err(|e| {
                ArchiveError::BadField {
                    name: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    reason: "name is not utf-8".to_string(),
                }
            })?;
            let [kind] = reader.array::<1>()?;
            let len = u64::from_le_bytes(reader.array()?) as usize;
            let value = match kind {
                0 => ArchiveValue::F64(
                    (0..len)
                        .map(|_| reader.array().map(f64::from_le_bytes))
                        .collect::<Result<_, _>>()?,
                ),
                1 => ArchiveValue::U64(
                    (0..len)
                        .map(|_| reader.array().map(u64::from_le_bytes))
                        .collect::<Result<_, _>>()?,
                ),
                other => {
                    return Err(ArchiveError::BadField {
                        name,
                        reason: format!("unknown element kind {}", other),
                    })
                }
            };
            archive.fields.insert(name, value);
        }

        archive.validate()?;
        Ok(archive)
    }

    fn validate(&self) -> Result<(), ArchiveError> {
        for name in [OBS_MEAN, OBS_VAR, RET_MEAN, RET_VAR] {
            match self.fields.get(name) {
                None => return Err(ArchiveError::MissingField(name.to_string())),
                Some(ArchiveValue::U64(_)) => {
                    return Err(ArchiveError::BadField {
                        name: name.to_string(),
                        reason: "expected f64 array".to_string(),
                    })
                }
                Some(ArchiveValue::F64(_)) => {}
            }
        }
        for name in [OBS_COUNT, RET_COUNT] {
            match self.fields.get(name) {
                None => return Err(ArchiveError::MissingField(name.to_string())),
                Some(ArchiveValue::U64(v)) if v.len() == 1 => {}
                Some(_) => {
                    return Err(ArchiveError::BadField {
                        name: name.to_string(),
                        reason: "expected a single u64".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        let available = self.bytes.len() - self.offset;
        if n > available {
            return Err(ArchiveError::Truncated {
                needed: n,
                available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ArchiveError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> NormalizerArchive {
        let mut obs = RunningNormalizer::new(3);
        obs.update(&[0.1, 2.0, -3.0, 1.0 / 3.0, 5.5, 1e-12]);
        let mut ret = RunningNormalizer::new(1);
        ret.update(&[0.7, -1.3, 2.9]);
        NormalizerArchive::from_stats(&obs, &ret)
    }

    #[test]
    fn test_bytes_restore_exact_values() {
        let archive = sample_archive();
        let restored = NormalizerArchive::from_bytes(&archive.to_bytes()).unwrap();
        assert_eq!(archive, restored);

        let (obs, ret) = restored.to_stats().unwrap();
        assert_eq!(obs.count(), 2);
        assert_eq!(ret.count(), 3);
        let names: Vec<&str> = restored.field_names().collect();
        assert_eq!(
            names,
            vec![OBS_COUNT, OBS_MEAN, OBS_VAR, RET_COUNT, RET_MEAN, RET_VAR]
        );
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample_archive().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            NormalizerArchive::from_bytes(&bytes),
            Err(ArchiveError::BadMagic)
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample_archive().to_bytes();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(
            NormalizerArchive::from_bytes(cut),
            Err(ArchiveError::Truncated { .. })
        ));
        assert!(matches!(
            NormalizerArchive::from_bytes(&bytes[..4]),
            Err(ArchiveError::Truncated { .. })
        ));
    }

    #[test]
    fn test_missing_field() {
        let mut archive = sample_archive();
        archive.fields.remove(RET_VAR);
        let err = NormalizerArchive::from_bytes(&archive.to_bytes()).unwrap_err();
        match err {
            ArchiveError::MissingField(name) => assert_eq!(name, RET_VAR),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_count_must_be_u64() {
        let mut archive = sample_archive();
        archive.insert(OBS_COUNT, ArchiveValue::F64(vec![2.0]));
        assert!(matches!(
            NormalizerArchive::from_bytes(&archive.to_bytes()),
            Err(ArchiveError::BadField { .. })
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("norm.bin");
        let archive = sample_archive();
        archive.save(&path).unwrap();
        assert_eq!(NormalizerArchive::load(&path).unwrap(), archive);

        let missing = NormalizerArchive::load(dir.path().join("absent.bin"));
        assert!(matches!(missing, Err(ArchiveError::Io(_))));
    }
}
