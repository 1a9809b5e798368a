//! History shard layout.

/// Protocol version for history shards and the history index.
pub const PROTOCOL_VERSION: u32 = 1;

/// Tensor names inside safetensors.
pub const T_FEATURES: &str = "features";
pub const T_PI: &str = "pi";
pub const T_Z: &str = "z";

/// Index of the batches making up a persisted history, oldest first.
pub const HISTORY_INDEX: &str = "history.json";

pub fn shard_stem(iteration: u32) -> String {
    format!("iter_{iteration:06}")
}
