//! az-controller: the iteration controller and checkpoint persistence.
//!
//! One iteration is self-play → train → arena → (accept: checkpoint), then saves the example
//! history and advances the iteration counter whatever the verdict. Stops are honoured only
//! between iterations.

pub mod checkpoint;
pub mod controller;

pub use checkpoint::{
    checkpoint_name, cleanup_stale_tmp, load_checkpoint, load_history, load_resume_point,
    read_best_pointer, resolve_checkpoint, save_checkpoint, save_history, BestPointer, Checkpoint,
    CheckpointError, ResumePoint, SavedHistory,
};
pub use controller::{
    ControllerError, IterationController, IterationReport, Phase, RunSummary, StopHandle,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
