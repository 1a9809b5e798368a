//! MCTS implementation (PUCT) for AlphaZero-style search.
//!
//! The design uses:
//! - Any `az_core::Game`; actions are indices into its fixed action space
//! - Nodes keyed by the game's canonical state key, stored in an index-addressed arena
//! - A pluggable `Evaluator` whose output is validated before it reaches the tree

pub mod arena;
pub mod infer;
pub mod mcts;
pub mod node;

pub use infer::{Evaluation, EvaluationError, Evaluator, UniformEvaluator};
pub use mcts::{
    apply_temperature, puct_select, Mcts, MctsConfig, SearchError, SearchResult,
    SearchStats,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!VERSION.is_empty());
    }
}

#[cfg(test)]
mod mcts_tests;
