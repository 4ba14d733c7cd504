//! Training progress logging.
//!
//! - [`ConsoleLogger`]: table on stdout
//! - [`CSVLogger`]: CSV file for analysis
//! - [`MultiLogger`]: fan out to several loggers

pub mod logger;

pub use logger::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, TrainingSnapshot};
