//! az-eval: arena games between the incumbent and a freshly trained candidate, tally
//! aggregation, and the gating decision.

pub mod arena;
pub mod result;

pub use arena::{arena_schedule, Arena, ArenaError, ArenaSettings, GameSpec};
pub use result::{decide, ArenaResult, GameResult, Verdict};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod eval_tests;
