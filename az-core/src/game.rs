//! The two-player game contract consumed by search, self-play and the arena.

use std::fmt::Debug;

use thiserror::Error;

use crate::player::{Outcome, Player};

/// Stable 64-bit key for a position, independent of `std` hash randomness.
pub type StateKey = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("illegal action {action} in current state")]
    IllegalAction { action: usize },
    #[error("game is already over")]
    Finished,
}

/// Rules of a deterministic, alternating-or-not, two-player zero-sum game.
///
/// States are immutable snapshots: `apply` returns a new state and never mutates its input.
/// Actions are indices into a fixed action space `0..action_space()`.
pub trait Game: Send + Sync {
    type State: Clone + Debug + Send + Sync;

    fn name(&self) -> &'static str;

    /// Size of the fixed action space (length of every policy vector).
    fn action_space(&self) -> usize;

    fn initial_state(&self) -> Self::State;

    fn to_play(&self, state: &Self::State) -> Player;

    /// Legal actions in ascending index order. Empty iff the state is terminal.
    fn legal_actions(&self, state: &Self::State) -> Vec<usize>;

    fn apply(&self, state: &Self::State, action: usize) -> Result<Self::State, GameError>;

    /// `None` while the game is still running.
    fn outcome(&self, state: &Self::State) -> Option<Outcome>;

    fn state_key(&self, state: &Self::State) -> StateKey;

    /// Feature vector from the point of view of the player to move.
    fn encode(&self, state: &Self::State) -> Vec<f32>;

    /// Equivalent `(features, policy)` pairs used to augment training data.
    ///
    /// The identity pair must be included. Games without symmetries keep the default.
    fn symmetries(&self, features: &[f32], pi: &[f32]) -> Vec<(Vec<f32>, Vec<f32>)> {
        vec![(features.to_vec(), pi.to_vec())]
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        self.outcome(state).is_some()
    }

    /// Boolean mask over the full action space.
    fn legal_mask(&self, state: &Self::State) -> Vec<bool> {
        let mut mask = vec![false; self.action_space()];
        for a in self.legal_actions(state) {
            if let Some(m) = mask.get_mut(a) {
                *m = true;
            }
        }
        mask
    }
}
