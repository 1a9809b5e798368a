//! az-core: two-player game contract, player/value types, and run configuration.

pub mod config;
pub mod game;
pub mod player;
pub mod tictactoe;

pub use config::{
    ArenaConfig, CheckpointConfig, Config, ConfigError, ControllerConfig, DrawPolicy,
    LoadFolderFile, MctsConfig, ReplayConfig, SelfplayConfig, TrainingConfig,
};
pub use game::{Game, GameError, StateKey};
pub use player::{Outcome, Player, PlayerValue};
pub use tictactoe::{Board, TicTacToe};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tictactoe_tests;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!VERSION.is_empty());
    }
}
