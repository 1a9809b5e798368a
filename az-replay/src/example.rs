use serde::{Deserialize, Serialize};

/// One self-play decision: encoded position, search policy target, and outcome target.
///
/// `z` is the final result from the point of view of the player to move in `features`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: Vec<f32>,
    pub pi: Vec<f32>,
    pub z: f32,
}

impl TrainingExample {
    pub fn new(features: Vec<f32>, pi: Vec<f32>, z: f32) -> Self {
        Self { features, pi, z }
    }
}
