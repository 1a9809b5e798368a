//! Run configuration for the self-play trainer.
//!
//! One immutable `Config` is loaded from YAML, validated once, and handed by reference to every
//! component. Field names are snake_case; the camelCase option names
//! (`numMCTSSims`, `maxlenOfQueue`, ...) are accepted as aliases.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading / validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Tree search settings.
    #[serde(default)]
    pub mcts: MctsConfig,
    /// Self-play settings.
    #[serde(default)]
    pub selfplay: SelfplayConfig,
    /// Evaluator training settings.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Candidate-vs-incumbent gating.
    #[serde(default)]
    pub arena: ArenaConfig,
    /// Training-example history retention.
    #[serde(default)]
    pub replay: ReplayConfig,
    /// Iteration loop bounds.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Checkpoint location and resume settings.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// MCTS algorithm configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MctsConfig {
    /// PUCT exploration constant.
    #[serde(default = "default_cpuct", alias = "c_puct")]
    pub cpuct: f32,
    /// Simulations per move decision.
    #[serde(default = "default_num_mcts_sims", alias = "numMCTSSims")]
    pub num_mcts_sims: u32,
    /// Keep the tree between successive moves of one game.
    #[serde(default = "default_true")]
    pub reuse_tree: bool,
    /// Dirichlet noise alpha (self-play root only).
    #[serde(default = "default_dirichlet_alpha")]
    pub dirichlet_alpha: f32,
    /// Fraction of root prior replaced by noise; 0 disables noise.
    #[serde(default)]
    pub dirichlet_epsilon: f32,
}

fn default_cpuct() -> f32 {
    2.0
}

fn default_num_mcts_sims() -> u32 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_dirichlet_alpha() -> f32 {
    0.3
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            cpuct: default_cpuct(),
            num_mcts_sims: default_num_mcts_sims(),
            reuse_tree: true,
            dirichlet_alpha: default_dirichlet_alpha(),
            dirichlet_epsilon: 0.0,
        }
    }
}

/// Self-play configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelfplayConfig {
    /// Games per iteration.
    #[serde(default = "default_num_eps", alias = "numEps")]
    pub num_eps: u32,
    /// Plies `< temp_threshold` sample from the visit distribution; later plies play argmax.
    #[serde(default = "default_temp_threshold", alias = "tempThreshold")]
    pub temp_threshold: u32,
    /// Worker threads for self-play and arena games (0 = one per logical CPU).
    #[serde(default)]
    pub workers: u32,
    /// Base seed; each game derives its own stream from this and its index.
    #[serde(default)]
    pub seed: u64,
}

fn default_num_eps() -> u32 {
    100
}

fn default_temp_threshold() -> u32 {
    30
}

impl Default for SelfplayConfig {
    fn default() -> Self {
        Self {
            num_eps: default_num_eps(),
            temp_threshold: default_temp_threshold(),
            workers: 0,
            seed: 0,
        }
    }
}

/// Training configuration (inputs to the evaluator's optimisation loop).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_learning_rate", alias = "lr")]
    pub learning_rate: f64,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    /// Seed for corpus shuffling and mini-batch order.
    #[serde(default)]
    pub seed: u64,
}

fn default_epochs() -> u32 {
    10
}

fn default_batch_size() -> u32 {
    64
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_momentum() -> f64 {
    0.9
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            momentum: default_momentum(),
            seed: 0,
        }
    }
}

/// How drawn arena games enter the candidate's win ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawPolicy {
    /// `wins / (wins + losses)`; draws are played but ignored by the ratio.
    #[default]
    Exclude,
    /// `(wins + draws / 2) / games`.
    Half,
}

impl DrawPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawPolicy::Exclude => "exclude",
            DrawPolicy::Half => "half",
        }
    }
}

/// Arena (gating) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArenaConfig {
    /// Games per arena run; 0 disables gating and accepts every candidate.
    #[serde(default = "default_arena_compare", alias = "arenaCompare")]
    pub arena_compare: u32,
    /// Minimum candidate win ratio for acceptance.
    #[serde(default = "default_update_threshold", alias = "updateThreshold")]
    pub update_threshold: f64,
    #[serde(default)]
    pub draw_policy: DrawPolicy,
}

fn default_arena_compare() -> u32 {
    20
}

fn default_update_threshold() -> f64 {
    0.6
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            arena_compare: default_arena_compare(),
            update_threshold: default_update_threshold(),
            draw_policy: DrawPolicy::Exclude,
        }
    }
}

/// Training-example history caps. Both are enforced at once.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    /// Maximum number of examples in the flattened corpus.
    #[serde(default = "default_maxlen_of_queue", alias = "maxlenOfQueue")]
    pub maxlen_of_queue: usize,
    /// Maximum number of per-iteration batches kept.
    #[serde(
        default = "default_num_iters_for_history",
        alias = "numItersForTrainExamplesHistory"
    )]
    pub num_iters_for_train_examples_history: usize,
}

fn default_maxlen_of_queue() -> usize {
    200_000
}

fn default_num_iters_for_history() -> usize {
    100
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            maxlen_of_queue: default_maxlen_of_queue(),
            num_iters_for_train_examples_history: default_num_iters_for_history(),
        }
    }
}

/// Iteration controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Last iteration to run (inclusive).
    #[serde(default = "default_num_iters", alias = "numIters")]
    pub num_iters: u32,
    /// First iteration when not resuming from a checkpoint.
    #[serde(default = "default_starting_iteration", alias = "startingIteration")]
    pub starting_iteration: u32,
}

fn default_num_iters() -> u32 {
    1
}

fn default_starting_iteration() -> u32 {
    1
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            num_iters: default_num_iters(),
            starting_iteration: default_starting_iteration(),
        }
    }
}

/// Location of a checkpoint to resume from: `folder/file`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoadFolderFile {
    pub folder: PathBuf,
    /// Checkpoint directory name, or `best` to follow the best-checkpoint pointer.
    pub file: String,
}

impl LoadFolderFile {
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.file)
    }
}

/// Checkpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_dir", alias = "checkpointDir")]
    pub checkpoint_dir: PathBuf,
    /// Resume from `load_folder_file` instead of starting fresh.
    #[serde(default, alias = "loadModel")]
    pub load_model: bool,
    #[serde(default, alias = "loadFolderFile")]
    pub load_folder_file: Option<LoadFolderFile>,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            load_model: false,
            load_folder_file: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file (not validated).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a YAML string (not validated).
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject out-of-range values before any iteration starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // mcts
        if !(self.mcts.cpuct.is_finite() && self.mcts.cpuct > 0.0) {
            return Err(invalid("mcts.cpuct", "must be finite and > 0"));
        }
        if self.mcts.num_mcts_sims < 1 {
            return Err(invalid("mcts.num_mcts_sims", "must be >= 1"));
        }
        if !(self.mcts.dirichlet_alpha.is_finite() && self.mcts.dirichlet_alpha > 0.0) {
            return Err(invalid("mcts.dirichlet_alpha", "must be finite and > 0"));
        }
        if !(0.0..=1.0).contains(&self.mcts.dirichlet_epsilon) {
            return Err(invalid("mcts.dirichlet_epsilon", "must be in [0,1]"));
        }

        // selfplay
        if self.selfplay.num_eps < 1 {
            return Err(invalid("selfplay.num_eps", "must be >= 1"));
        }

        // training
        if self.training.epochs < 1 {
            return Err(invalid("training.epochs", "must be >= 1"));
        }
        if self.training.batch_size < 1 {
            return Err(invalid("training.batch_size", "must be >= 1"));
        }
        if !(self.training.learning_rate.is_finite() && self.training.learning_rate > 0.0) {
            return Err(invalid("training.learning_rate", "must be finite and > 0"));
        }
        if !(0.0..1.0).contains(&self.training.momentum) {
            return Err(invalid("training.momentum", "must be in [0,1)"));
        }

        // arena
        if !(0.0..=1.0).contains(&self.arena.update_threshold) {
            return Err(invalid(
                "arena.update_threshold",
                format!("must be in [0,1], got {}", self.arena.update_threshold),
            ));
        }

        // replay
        if self.replay.maxlen_of_queue < 1 {
            return Err(invalid("replay.maxlen_of_queue", "must be >= 1"));
        }
        if self.replay.num_iters_for_train_examples_history < 1 {
            return Err(invalid(
                "replay.num_iters_for_train_examples_history",
                "must be >= 1",
            ));
        }

        // controller
        if self.controller.num_iters < 1 {
            return Err(invalid("controller.num_iters", "must be >= 1"));
        }
        if self.controller.starting_iteration < 1 {
            return Err(invalid("controller.starting_iteration", "must be >= 1"));
        }
        if self.controller.starting_iteration > self.controller.num_iters {
            return Err(invalid(
                "controller.starting_iteration",
                format!("must be <= num_iters ({})", self.controller.num_iters),
            ));
        }

        // checkpoint
        if self.checkpoint.checkpoint_dir.as_os_str().is_empty() {
            return Err(invalid("checkpoint.checkpoint_dir", "must be non-empty"));
        }
        if self.checkpoint.load_model {
            match &self.checkpoint.load_folder_file {
                None => {
                    return Err(invalid(
                        "checkpoint.load_folder_file",
                        "is required when load_model=true",
                    ))
                }
                Some(lf) if lf.file.trim().is_empty() => {
                    return Err(invalid("checkpoint.load_folder_file.file", "must be non-empty"))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
