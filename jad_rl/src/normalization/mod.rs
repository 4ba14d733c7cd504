//! Observation and reward normalization.

pub mod archive;
pub mod selective;

pub use archive::{ArchiveError, ArchiveValue, NormalizerArchive};
pub use selective::{MaskError, NormalizationConfig, NormalizeMask, SelectiveNormalizationLayer};
