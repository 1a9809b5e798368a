//! Training entry point shared by every evaluator the controller can improve.

use az_mcts::Evaluator;
use az_replay::TrainingExample;
use thiserror::Error;

/// Optimiser inputs. Values come from the `training` config section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainParams {
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Seeds mini-batch order.
    pub seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self::from(&az_core::TrainingConfig::default())
    }
}

impl From<&az_core::TrainingConfig> for TrainParams {
    fn from(c: &az_core::TrainingConfig) -> Self {
        Self {
            epochs: c.epochs,
            batch_size: c.batch_size,
            learning_rate: c.learning_rate,
            momentum: c.momentum,
            seed: c.seed,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("training corpus is empty")]
    EmptyCorpus,
    #[error("example {index}: policy target has {got} entries, expected {expected}")]
    PolicyShape {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("example {index}: non-finite target")]
    NonFinite { index: usize },
    #[error("invalid training parameters: {msg}")]
    InvalidParams { msg: &'static str },
}

/// An evaluator that can be fitted to a corpus.
///
/// `train` returns a new evaluator; the receiver keeps serving as the incumbent.
pub trait Trainable: Evaluator + Sized {
    fn train(&self, corpus: &[TrainingExample], params: &TrainParams) -> Result<Self, TrainError>;
}

/// Reject corpora and parameters no optimiser can use.
pub fn check_inputs(
    corpus: &[TrainingExample],
    params: &TrainParams,
    action_space: usize,
) -> Result<(), TrainError> {
    if params.epochs == 0 {
        return Err(TrainError::InvalidParams {
            msg: "epochs must be >= 1",
        });
    }
    if params.batch_size == 0 {
        return Err(TrainError::InvalidParams {
            msg: "batch_size must be >= 1",
        });
    }
    if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
        return Err(TrainError::InvalidParams {
            msg: "learning_rate must be finite and > 0",
        });
    }
    if !(0.0..1.0).contains(&params.momentum) {
        return Err(TrainError::InvalidParams {
            msg: "momentum must be in [0,1)",
        });
    }
    if corpus.is_empty() {
        return Err(TrainError::EmptyCorpus);
    }
    for (index, ex) in corpus.iter().enumerate() {
        if ex.pi.len() != action_space {
            return Err(TrainError::PolicyShape {
                index,
                expected: action_space,
                got: ex.pi.len(),
            });
        }
        if !ex.z.is_finite() || ex.pi.iter().any(|p| !p.is_finite()) {
            return Err(TrainError::NonFinite { index });
        }
    }
    Ok(())
}
