//! az-logging: NDJSON events, the run manifest, and logger setup.
//!
//! Everything here is append-only or written atomically (tmp file + rename), so a crash
//! never leaves a half-written `run.json` behind.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run manifest schema version.
pub const RUN_MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum NdjsonError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Arena tallies as recorded in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArenaSummaryV1 {
    pub games: u32,
    pub candidate_wins: u32,
    pub incumbent_wins: u32,
    pub draws: u32,
    pub win_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationSummaryV1 {
    pub iteration: u32,
    pub started_ts_ms: u64,
    pub ended_ts_ms: Option<u64>,
    pub games: u64,
    pub examples_generated: u64,
    pub corpus_size: u64,
    pub dropped_examples: u64,
    /// `None` when gating is disabled.
    pub arena: Option<ArenaSummaryV1>,
    /// "accept" | "reject"
    pub verdict: Option<String>,
    pub checkpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifestV1 {
    pub run_manifest_version: u32,

    pub run_id: String,
    pub created_ts_ms: u64,
    pub game: String,
    pub config_hash: Option<String>,

    pub phase: String,
    pub phase_ts_ms: u64,

    pub selfplay_games_completed: u64,
    pub last_completed_iteration: Option<u32>,
    pub best_checkpoint: Option<String>,
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub iterations: Vec<IterationSummaryV1>,
}

impl RunManifestV1 {
    pub fn new(run_id: impl Into<String>, game: impl Into<String>) -> Self {
        let ts = now_ms();
        Self {
            run_manifest_version: RUN_MANIFEST_VERSION,
            run_id: run_id.into(),
            created_ts_ms: ts,
            game: game.into(),
            config_hash: None,
            phase: "idle".to_string(),
            phase_ts_ms: ts,
            selfplay_games_completed: 0,
            last_completed_iteration: None,
            best_checkpoint: None,
            error: None,
            iterations: Vec::new(),
        }
    }

    /// Entry for `iteration`, created on first use.
    pub fn iteration_mut(&mut self, iteration: u32) -> &mut IterationSummaryV1 {
        let pos = match self.iterations.iter().position(|it| it.iteration == iteration) {
            Some(p) => p,
            None => {
                self.iterations.push(IterationSummaryV1 {
                    iteration,
                    started_ts_ms: now_ms(),
                    ..IterationSummaryV1::default()
                });
                self.iterations.len() - 1
            }
        };
        &mut self.iterations[pos]
    }
}

pub fn now_ms() -> u64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_millis() as u64
}

pub fn hash_config_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<RunManifestV1, NdjsonError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<RunManifestV1>(&bytes)?)
}

pub fn write_manifest_atomic(path: impl AsRef<Path>, m: &RunManifestV1) -> Result<(), NdjsonError> {
    write_json_atomic(path, m)
}

/// Pretty JSON via `<path>.tmp` and a rename.
pub fn write_json_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), NdjsonError> {
    let path = path.as_ref();
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfplayGameEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,
    pub run_id: String,
    pub iteration: u32,
    pub game_index: u64,
    pub seed: u64,
    pub plies: u32,
    /// "first" | "second" | "draw"
    pub outcome: &'static str,
    pub examples: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArenaEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,
    pub run_id: String,
    pub iteration: u32,
    pub games: u32,
    pub candidate_wins: u32,
    pub incumbent_wins: u32,
    pub draws: u32,
    pub win_ratio: Option<f64>,
    pub threshold: f64,
    pub draw_policy: &'static str,
    pub verdict: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,
    pub run_id: String,
    pub iteration: u32,
    pub examples_generated: u64,
    pub corpus_size: u64,
    pub corpus_batches: u64,
    pub dropped_examples: u64,
    pub verdict: &'static str,
    pub checkpoint: Option<String>,
}

/// Append-only NDJSON writer.
///
/// Contract: each call writes exactly one JSON object followed by a newline.
pub struct NdjsonWriter {
    w: BufWriter<File>,
    lines_since_flush: u64,
    flush_every_lines: u64,
}

impl NdjsonWriter {
    /// Open a file for append. Creates it if it doesn't exist.
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, NdjsonError> {
        Self::open_append_with_flush(path, 0)
    }

    /// `flush_every_lines=0` disables periodic flushing.
    pub fn open_append_with_flush(
        path: impl AsRef<Path>,
        flush_every_lines: u64,
    ) -> Result<Self, NdjsonError> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            w: BufWriter::new(f),
            lines_since_flush: 0,
            flush_every_lines,
        })
    }

    pub fn write_event<T: Serialize>(&mut self, event: &T) -> Result<(), NdjsonError> {
        let mut buf = serde_json::to_vec(event)?;
        buf.push(b'\n');
        self.w.write_all(&buf)?;
        self.lines_since_flush += 1;
        if self.flush_every_lines > 0 && self.lines_since_flush >= self.flush_every_lines {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), NdjsonError> {
        self.w.flush()?;
        self.lines_since_flush = 0;
        Ok(())
    }
}

/// Install `env_logger`, honouring `RUST_LOG` and falling back to `default_filter`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
