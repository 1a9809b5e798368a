//! az-model: the trainable side of the evaluator contract.

pub mod tabular;
pub mod train;

pub use tabular::TabularEvaluator;
pub use train::{TrainError, TrainParams, Trainable};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
