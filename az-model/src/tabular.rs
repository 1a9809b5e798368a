//! Lookup-table evaluator: one row of policy logits and one value parameter per position.
//!
//! Positions are identified by a blake3 digest of their feature vector, so symmetric copies
//! produced by augmentation train separate rows. Small games only.

use std::collections::BTreeMap;

use az_mcts::{Evaluation, EvaluationError, Evaluator};
use az_replay::TrainingExample;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::train::{check_inputs, TrainError, TrainParams, Trainable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    logits: Vec<f32>,
    /// Pre-activation; the reported value is `tanh(value)`.
    value: f32,
}

impl Row {
    fn zeros(action_space: usize) -> Self {
        Self {
            logits: vec![0.0; action_space],
            value: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularEvaluator {
    action_space: usize,
    rows: BTreeMap<u64, Row>,
}

/// Stable 64-bit key of a feature vector.
pub fn feature_key(features: &[f32]) -> u64 {
    let h = blake3::hash(bytemuck::cast_slice(features));
    let mut b = [0u8; 8];
    b.copy_from_slice(&h.as_bytes()[..8]);
    u64::from_le_bytes(b)
}

impl TabularEvaluator {
    /// An untrained table: uniform policy and zero value everywhere.
    pub fn new(action_space: usize) -> Self {
        Self {
            action_space,
            rows: BTreeMap::new(),
        }
    }

    pub fn action_space(&self) -> usize {
        self.action_space
    }

    /// Number of positions with trained parameters.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn softmax(logits: &[f32], mask: impl Fn(usize) -> bool) -> Vec<f32> {
    let max = logits
        .iter()
        .enumerate()
        .filter(|&(a, _)| mask(a))
        .map(|(_, &l)| l)
        .fold(f32::NEG_INFINITY, f32::max);
    let mut out = vec![0.0f32; logits.len()];
    if !max.is_finite() {
        return out;
    }
    let mut sum = 0.0f64;
    for (a, &l) in logits.iter().enumerate() {
        if mask(a) {
            let z = ((l - max) as f64).exp();
            out[a] = z as f32;
            sum += z;
        }
    }
    for v in &mut out {
        *v = (*v as f64 / sum) as f32;
    }
    out
}

impl Evaluator for TabularEvaluator {
    fn evaluate(&self, features: &[f32], legal: &[bool]) -> Result<Evaluation, EvaluationError> {
        if legal.len() != self.action_space {
            return Err(EvaluationError::PolicyLength {
                expected: self.action_space,
                got: legal.len(),
            });
        }
        if !legal.iter().any(|&ok| ok) {
            return Err(EvaluationError::NoLegalMass);
        }
        match self.rows.get(&feature_key(features)) {
            Some(row) => Ok(Evaluation {
                policy: softmax(&row.logits, |a| legal[a]),
                value: row.value.tanh(),
            }),
            None => Ok(Evaluation {
                policy: az_mcts::infer::uniform_over_legal(legal),
                value: 0.0,
            }),
        }
    }
}

impl Trainable for TabularEvaluator {
    /// Mini-batch SGD with momentum: cross-entropy on the policy, squared error on the value.
    fn train(&self, corpus: &[TrainingExample], params: &TrainParams) -> Result<Self, TrainError> {
        check_inputs(corpus, params, self.action_space)?;

        let a_len = self.action_space;
        let lr = params.learning_rate as f32;
        let momentum = params.momentum as f32;
        let keys: Vec<u64> = corpus.iter().map(|e| feature_key(&e.features)).collect();

        let mut next = self.clone();
        let mut velocity: BTreeMap<u64, Row> = BTreeMap::new();
        let mut order: Vec<usize> = (0..corpus.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut loss_pi = 0.0f64;
            let mut loss_v = 0.0f64;

            for chunk in order.chunks(params.batch_size as usize) {
                let mut grads: BTreeMap<u64, Row> = BTreeMap::new();
                for &i in chunk {
                    let ex = &corpus[i];
                    let row = next
                        .rows
                        .entry(keys[i])
                        .or_insert_with(|| Row::zeros(a_len));
                    let g = grads.entry(keys[i]).or_insert_with(|| Row::zeros(a_len));

                    let p = softmax(&row.logits, |_| true);
                    for a in 0..a_len {
                        g.logits[a] += p[a] - ex.pi[a];
                        if ex.pi[a] > 0.0 {
                            loss_pi -= (ex.pi[a] as f64) * (p[a].max(1e-12) as f64).ln();
                        }
                    }
                    let v = row.value.tanh();
                    g.value += 2.0 * (v - ex.z) * (1.0 - v * v);
                    loss_v += ((v - ex.z) as f64).powi(2);
                }

                let scale = 1.0 / chunk.len() as f32;
                for (k, g) in grads {
                    let vel = velocity.entry(k).or_insert_with(|| Row::zeros(a_len));
                    let Some(row) = next.rows.get_mut(&k) else {
                        continue;
                    };
                    for a in 0..a_len {
                        vel.logits[a] = momentum * vel.logits[a] - lr * g.logits[a] * scale;
                        row.logits[a] += vel.logits[a];
                    }
                    vel.value = momentum * vel.value - lr * g.value * scale;
                    row.value += vel.value;
                }
            }

            let n = corpus.len() as f64;
            log::debug!(
                "train epoch {}/{}: policy_loss={:.4} value_loss={:.4}",
                epoch + 1,
                params.epochs,
                loss_pi / n,
                loss_v / n
            );
        }
        Ok(next)
    }
}
