//! Checkpoint persistence.
//!
//! Layout under the checkpoint directory:
//! - `checkpoint_{iteration:06}/model.json`: iteration, game name and evaluator parameters
//! - `checkpoint_{iteration:06}/examples/`: example history shards (see `az-replay`)
//! - `best.json`: pointer to the incumbent checkpoint
//! - `history/`: the example history as of the last finished iteration, accepted or not
//!
//! Checkpoints and `history/` are assembled in `<name>.tmp/` and renamed into place once
//! complete. A directory being replaced is first renamed to `<name>.old.tmp/` and removed
//! only after the new one is in place, so an interrupted save never damages the previous
//! incumbent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use az_core::LoadFolderFile;
use az_logging::NdjsonError;
use az_replay::{read_history, write_history, IterationBatch, ReplayError, TrainingExampleStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BEST_POINTER: &str = "best.json";
pub const MODEL_FILE: &str = "model.json";
pub const EXAMPLES_DIR: &str = "examples";
pub const HISTORY_DIR: &str = "history";
pub const PROGRESS_FILE: &str = "progress.json";
/// `file` value in `load_folder_file` that follows [`BEST_POINTER`].
pub const BEST_ALIAS: &str = "best";

const TMP_SUFFIX: &str = ".tmp";
const ASIDE_SUFFIX: &str = ".old.tmp";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    Missing(PathBuf),
    #[error("corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),
    #[error("manifest error: {0}")]
    Manifest(#[from] NdjsonError),
}

pub fn checkpoint_name(iteration: u32) -> String {
    format!("checkpoint_{iteration:06}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFile<E> {
    iteration: u32,
    game: String,
    evaluator: E,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPointer {
    pub checkpoint: String,
    pub iteration: u32,
    pub ts_ms: u64,
}

/// A loaded checkpoint: the accepted evaluator and the history it was trained on.
#[derive(Debug, Clone)]
pub struct Checkpoint<E> {
    pub iteration: u32,
    pub game: String,
    pub evaluator: E,
    pub history: Vec<IterationBatch>,
}

/// Example history saved at the end of an iteration.
#[derive(Debug, Clone)]
pub struct SavedHistory {
    pub iteration: u32,
    pub game: String,
    pub history: Vec<IterationBatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Progress {
    iteration: u32,
    game: String,
    ts_ms: u64,
}

/// State a resumed run starts from.
#[derive(Debug, Clone)]
pub struct ResumePoint<E> {
    /// `None` when the run never accepted a candidate.
    pub incumbent: Option<E>,
    pub best_iteration: Option<u32>,
    /// Last iteration whose examples are in `history`.
    pub last_iteration: u32,
    pub history: Vec<IterationBatch>,
}

/// Persist `evaluator` and `store` as the checkpoint for `iteration`, then point
/// `best.json` at it. Returns the checkpoint directory.
pub fn save_checkpoint<E: Serialize>(
    dir: &Path,
    iteration: u32,
    game: &str,
    evaluator: &E,
    store: &TrainingExampleStore,
) -> Result<PathBuf, CheckpointError> {
    fs::create_dir_all(dir)?;
    cleanup_stale_tmp(dir)?;

    let name = checkpoint_name(iteration);
    let final_dir = dir.join(&name);
    let tmp_dir = dir.join(format!("{name}{TMP_SUFFIX}"));
    fs::create_dir_all(&tmp_dir)?;

    let model = ModelFile {
        iteration,
        game: game.to_string(),
        evaluator,
    };
    fs::write(tmp_dir.join(MODEL_FILE), serde_json::to_vec(&model)?)?;
    write_history(&tmp_dir.join(EXAMPLES_DIR), store)?;

    let aside = move_aside(&final_dir)?;
    fs::rename(&tmp_dir, &final_dir)?;

    az_logging::write_json_atomic(
        dir.join(BEST_POINTER),
        &BestPointer {
            checkpoint: name,
            iteration,
            ts_ms: az_logging::now_ms(),
        },
    )?;
    if let Some(old) = aside {
        fs::remove_dir_all(old)?;
    }
    log::debug!("checkpoint written: {}", final_dir.display());
    Ok(final_dir)
}

/// Rename an existing `path` to `<path>.old.tmp` and return the new location.
fn move_aside(path: &Path) -> Result<Option<PathBuf>, CheckpointError> {
    if !path.exists() {
        return Ok(None);
    }
    let mut name = path.as_os_str().to_owned();
    name.push(ASIDE_SUFFIX);
    let aside = PathBuf::from(name);
    if aside.exists() {
        fs::remove_dir_all(&aside)?;
    }
    fs::rename(path, &aside)?;
    Ok(Some(aside))
}

/// Persist the example history reached at the end of `iteration` as `dir/history/`.
///
/// Written every iteration, so examples of rejected iterations survive a restart.
pub fn save_history(
    dir: &Path,
    iteration: u32,
    game: &str,
    store: &TrainingExampleStore,
) -> Result<PathBuf, CheckpointError> {
    let final_dir = dir.join(HISTORY_DIR);
    let tmp_dir = dir.join(format!("{HISTORY_DIR}{TMP_SUFFIX}"));
    if tmp_dir.exists() {
        fs::remove_dir_all(&tmp_dir)?;
    }
    fs::create_dir_all(&tmp_dir)?;

    write_history(&tmp_dir.join(EXAMPLES_DIR), store)?;
    let progress = Progress {
        iteration,
        game: game.to_string(),
        ts_ms: az_logging::now_ms(),
    };
    fs::write(tmp_dir.join(PROGRESS_FILE), serde_json::to_vec_pretty(&progress)?)?;

    let aside = move_aside(&final_dir)?;
    fs::rename(&tmp_dir, &final_dir)?;
    if let Some(old) = aside {
        fs::remove_dir_all(old)?;
    }
    log::debug!("history written: {} ({} examples)", final_dir.display(), store.len());
    Ok(final_dir)
}

/// History saved by [`save_history`] under `dir`, if any.
pub fn load_history(dir: &Path) -> Result<Option<SavedHistory>, CheckpointError> {
    let path = dir.join(HISTORY_DIR);
    if !path.is_dir() {
        return Ok(None);
    }
    let corrupt = |reason: String| CheckpointError::Corrupt {
        path: path.clone(),
        reason,
    };
    let bytes = fs::read(path.join(PROGRESS_FILE))
        .map_err(|e| corrupt(format!("{PROGRESS_FILE}: {e}")))?;
    let progress: Progress =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("{PROGRESS_FILE}: {e}")))?;
    let history = read_history(&path.join(EXAMPLES_DIR))
        .map_err(|e| corrupt(format!("{EXAMPLES_DIR}: {e}")))?;
    Ok(Some(SavedHistory {
        iteration: progress.iteration,
        game: progress.game,
        history,
    }))
}

fn check_game(path: &Path, saved: &str, game: &str) -> Result<(), CheckpointError> {
    if saved == game {
        return Ok(());
    }
    Err(CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason: format!("saved for game {saved:?}, running {game:?}"),
    })
}

/// Resolve `load_folder_file` into the state a run continues from.
///
/// A named checkpoint is restored exactly as saved. `file: best` continues the run in
/// `folder`: the best checkpoint supplies the incumbent, and `history/` supplies the examples
/// when it is newer. A run that never accepted a candidate resumes from `history/` alone.
pub fn load_resume_point<E: DeserializeOwned>(
    lff: &LoadFolderFile,
    game: &str,
) -> Result<ResumePoint<E>, CheckpointError> {
    let latest = if lff.file == BEST_ALIAS {
        load_history(&lff.folder)?
    } else {
        None
    };
    let checkpoint = match resolve_checkpoint(lff) {
        Ok(path) => {
            let ck = load_checkpoint::<E>(&path)?;
            check_game(&path, &ck.game, game)?;
            Some(ck)
        }
        Err(CheckpointError::Missing(_)) if latest.is_some() => None,
        Err(e) => return Err(e),
    };

    let mut point = match checkpoint {
        Some(ck) => ResumePoint {
            incumbent: Some(ck.evaluator),
            best_iteration: Some(ck.iteration),
            last_iteration: ck.iteration,
            history: ck.history,
        },
        None => ResumePoint {
            incumbent: None,
            best_iteration: None,
            last_iteration: 0,
            history: Vec::new(),
        },
    };
    if let Some(h) = latest {
        check_game(&lff.folder.join(HISTORY_DIR), &h.game, game)?;
        if h.iteration > point.last_iteration {
            point.last_iteration = h.iteration;
            point.history = h.history;
        }
    }
    Ok(point)
}

pub fn read_best_pointer(dir: &Path) -> Result<BestPointer, CheckpointError> {
    let path = dir.join(BEST_POINTER);
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CheckpointError::Missing(path))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
        path,
        reason: e.to_string(),
    })
}

/// Directory named by `load_folder_file`; `file: best` follows `best.json`.
pub fn resolve_checkpoint(lff: &LoadFolderFile) -> Result<PathBuf, CheckpointError> {
    if lff.file == BEST_ALIAS {
        let best = read_best_pointer(&lff.folder)?;
        Ok(lff.folder.join(best.checkpoint))
    } else {
        Ok(lff.path())
    }
}

pub fn load_checkpoint<E: DeserializeOwned>(path: &Path) -> Result<Checkpoint<E>, CheckpointError> {
    if !path.is_dir() {
        return Err(CheckpointError::Missing(path.to_path_buf()));
    }
    let corrupt = |reason: String| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path.join(MODEL_FILE))
        .map_err(|e| corrupt(format!("{MODEL_FILE}: {e}")))?;
    let model: ModelFile<E> =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("{MODEL_FILE}: {e}")))?;
    let history = read_history(&path.join(EXAMPLES_DIR))
        .map_err(|e| corrupt(format!("{EXAMPLES_DIR}: {e}")))?;

    Ok(Checkpoint {
        iteration: model.iteration,
        game: model.game,
        evaluator: model.evaluator,
        history,
    })
}

/// Remove `*.tmp` directories left by an interrupted save. Returns how many were removed.
pub fn cleanup_stale_tmp(dir: &Path) -> Result<usize, CheckpointError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_tmp = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.ends_with(TMP_SUFFIX));
        if is_tmp && entry.file_type()?.is_dir() {
            log::warn!("removing partial checkpoint {}", entry.path().display());
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
