//! Worker runtime: self-play games and the thread pool they run on.

pub mod pool;
pub mod seed;
pub mod self_play;

pub use pool::{PoolError, WorkerPool};
pub use seed::{game_seed, splitmix64};
pub use self_play::{GameRecord, SelfPlayConfig, SelfPlayEngine, SelfPlayError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
