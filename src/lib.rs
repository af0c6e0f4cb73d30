// Bending non-positive-definite matrices

#![doc = include_str!("../README.md")]

pub mod bending;
pub mod correction;
pub mod error;
pub mod fit_stats;
pub mod linalg_backends;
pub mod observer;
pub mod spectrum;
pub mod utils;
pub mod validation;
pub mod weights;

#[cfg(test)]
mod bending_tests;

pub use bending::{bend, AlreadyPdPolicy, BendConfig, BendMethod, BendOutcome, BendResult, MatrixBender};
pub use error::BendError;
pub use fit_stats::{DeviationStats, WeightedDeviationStats};
pub use observer::{BendObserver, IterationProgress, LoggingObserver, RecordingObserver};
pub use utils::{covariance_to_correlation, is_positive_definite};
