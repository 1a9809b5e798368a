//! az-replay: training examples, the bounded per-iteration example history, and its
//! safetensors shard persistence.

pub mod example;
pub mod schema;
pub mod store;
pub mod writer;

pub use example::TrainingExample;
pub use store::{AppendReport, IterationBatch, TrainingExampleStore};
pub use writer::{cleanup_tmp_files, read_history, write_history, ReplayError, ShardMeta};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod writer_tests;
