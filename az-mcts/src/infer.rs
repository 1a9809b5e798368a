//! Evaluator interface and output validation.

use thiserror::Error;

/// Tolerance on `sum(policy) == 1`.
pub const POLICY_SUM_TOLERANCE: f32 = 1e-3;

/// Output of one evaluator call.
///
/// - `policy[a]` is a probability over the full action space (sums to 1).
/// - `value` is in [-1,1] from the POV of the player to move in the encoded state.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub policy: Vec<f32>,
    pub value: f32,
}

#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("policy has {got} entries, expected {expected}")]
    PolicyLength { expected: usize, got: usize },
    #[error("policy contains a non-finite or negative entry at action {action}")]
    BadProbability { action: usize },
    #[error("policy sums to {sum}, expected 1")]
    PolicySum { sum: f32 },
    #[error("value {value} is outside [-1, 1]")]
    ValueOutOfRange { value: f32 },
    #[error("policy puts no mass on any legal action")]
    NoLegalMass,
    #[error("evaluator failed: {0}")]
    Backend(String),
}

/// Policy/value function consulted by the search.
///
/// Shared read-only across worker threads during self-play and arena games.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, features: &[f32], legal: &[bool]) -> Result<Evaluation, EvaluationError>;
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    fn evaluate(&self, features: &[f32], legal: &[bool]) -> Result<Evaluation, EvaluationError> {
        (**self).evaluate(features, legal)
    }
}

/// Uniform policy over legal actions + zero value (baseline).
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformEvaluator;

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, _features: &[f32], legal: &[bool]) -> Result<Evaluation, EvaluationError> {
        Ok(Evaluation {
            policy: uniform_over_legal(legal),
            value: 0.0,
        })
    }
}

pub fn uniform_over_legal(legal: &[bool]) -> Vec<f32> {
    let mut out = vec![0.0f32; legal.len()];
    let cnt = legal.iter().filter(|&&ok| ok).count();
    if cnt == 0 {
        return out;
    }
    let u = 1.0 / (cnt as f32);
    for (o, &ok) in out.iter_mut().zip(legal) {
        if ok {
            *o = u;
        }
    }
    out
}

/// Check an evaluation and return priors restricted to `actions`, renormalised to sum 1.
///
/// Malformed output is an error; it is never replaced with a uniform prior.
pub fn legal_priors(
    eval: &Evaluation,
    action_space: usize,
    actions: &[usize],
) -> Result<Vec<f32>, EvaluationError> {
    if eval.policy.len() != action_space {
        return Err(EvaluationError::PolicyLength {
            expected: action_space,
            got: eval.policy.len(),
        });
    }
    if let Some(action) = eval
        .policy
        .iter()
        .position(|p| !p.is_finite() || *p < 0.0)
    {
        return Err(EvaluationError::BadProbability { action });
    }
    let sum: f32 = eval.policy.iter().sum();
    if (sum - 1.0).abs() > POLICY_SUM_TOLERANCE {
        return Err(EvaluationError::PolicySum { sum });
    }
    if !(eval.value.is_finite() && (-1.0..=1.0).contains(&eval.value)) {
        return Err(EvaluationError::ValueOutOfRange { value: eval.value });
    }

    let mut priors: Vec<f32> = actions
        .iter()
        .map(|&a| eval.policy.get(a).copied().unwrap_or(0.0))
        .collect();
    let mass: f32 = priors.iter().sum();
    if !(mass.is_finite() && mass > 0.0) {
        return Err(EvaluationError::NoLegalMass);
    }
    for p in &mut priors {
        *p /= mass;
    }
    Ok(priors)
}
