//! The training loop: self-play, train, gate, checkpoint, repeat.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use az_core::{Config, ConfigError, Game, Outcome};
use az_eval::{Arena, ArenaError, ArenaResult, ArenaSettings, Verdict};
use az_logging::{
    ArenaEventV1, ArenaSummaryV1, IterationEventV1, NdjsonError, NdjsonWriter, RunManifestV1,
    SelfplayGameEventV1,
};
use az_model::{TrainError, TrainParams, Trainable};
use az_replay::TrainingExampleStore;
use az_runtime::{
    game_seed, PoolError, SelfPlayConfig, SelfPlayEngine, SelfPlayError, WorkerPool,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::checkpoint::{
    checkpoint_name, load_resume_point, save_checkpoint, save_history, CheckpointError,
};

pub const RUN_MANIFEST: &str = "run.json";
pub const CONFIG_SNAPSHOT: &str = "config.yaml";
pub const EVENTS_FILE: &str = "events.ndjson";
pub const LOGS_DIR: &str = "logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SelfPlaying,
    Training,
    Arenating,
    Checkpointing,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::SelfPlaying => "selfplay",
            Phase::Training => "train",
            Phase::Arenating => "arena",
            Phase::Checkpointing => "checkpoint",
            Phase::Done => "done",
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("self-play error: {0}")]
    SelfPlay(#[from] SelfPlayError),
    #[error("training error: {0}")]
    Train(#[from] TrainError),
    #[error("arena error: {0}")]
    Arena(#[from] ArenaError),
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("run log error: {0}")]
    Log(#[from] NdjsonError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cloneable stop request, honoured at the next iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: u32,
    pub games: usize,
    pub examples_generated: usize,
    pub corpus_size: usize,
    pub dropped_examples: usize,
    /// `None` when gating is disabled (`arena_compare = 0`).
    pub arena: Option<ArenaResult>,
    pub verdict: Verdict,
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub first_iteration: u32,
    pub iterations: Vec<IterationReport>,
    pub stopped_early: bool,
    /// Iteration of the incumbent at the end of the run, if any was ever accepted or loaded.
    pub best_iteration: Option<u32>,
}

impl RunSummary {
    pub fn accepted(&self) -> usize {
        self.iterations
            .iter()
            .filter(|r| r.verdict.is_accept())
            .count()
    }
}

pub struct IterationController<'g, G: Game, E> {
    config: Config,
    game: &'g G,
    incumbent: E,
    best_iteration: Option<u32>,
    store: TrainingExampleStore,
    next_iteration: u32,
    first_iteration: u32,
    phase: Phase,
    stop: StopHandle,
    pool: WorkerPool,
    run_dir: PathBuf,
    manifest: RunManifestV1,
    events: NdjsonWriter,
}

impl<'g, G, E> IterationController<'g, G, E>
where
    G: Game,
    E: Trainable + Serialize + DeserializeOwned,
{
    /// Validate `config`, then either resume from the configured checkpoint or start fresh
    /// from `initial`.
    ///
    /// A requested checkpoint that is missing or unreadable is an error. `initial` is used on
    /// resume only when the run being continued never accepted a candidate.
    pub fn new(config: Config, game: &'g G, initial: E) -> Result<Self, ControllerError> {
        config.validate()?;

        let store_caps = (
            config.replay.maxlen_of_queue,
            config.replay.num_iters_for_train_examples_history,
        );
        let resume = config
            .checkpoint
            .load_folder_file
            .as_ref()
            .filter(|_| config.checkpoint.load_model);

        let (incumbent, store, next_iteration, best_iteration) = match resume {
            Some(lff) => {
                let point = load_resume_point::<E>(lff, game.name())?;
                let store =
                    TrainingExampleStore::from_batches(store_caps.0, store_caps.1, point.history);
                log::info!(
                    "resuming from {} (iteration {}, {} examples in history)",
                    lff.path().display(),
                    point.last_iteration,
                    store.len()
                );
                let incumbent = match point.incumbent {
                    Some(e) => e,
                    None => {
                        log::info!("no accepted checkpoint yet; the initial evaluator stays");
                        initial
                    }
                };
                (
                    incumbent,
                    store,
                    point.last_iteration + 1,
                    point.best_iteration,
                )
            }
            None => (
                initial,
                TrainingExampleStore::new(store_caps.0, store_caps.1),
                config.controller.starting_iteration,
                None,
            ),
        };

        let run_dir = config.checkpoint.checkpoint_dir.clone();
        std::fs::create_dir_all(run_dir.join(LOGS_DIR))?;
        let manifest = ensure_manifest(&run_dir, &config, game.name())?;
        let events =
            NdjsonWriter::open_append_with_flush(run_dir.join(LOGS_DIR).join(EVENTS_FILE), 64)?;
        let pool = WorkerPool::new(config.selfplay.workers as usize)?;

        Ok(Self {
            config,
            game,
            incumbent,
            best_iteration,
            store,
            next_iteration,
            first_iteration: next_iteration,
            phase: Phase::Idle,
            stop: StopHandle::default(),
            pool,
            run_dir,
            manifest,
            events,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn next_iteration(&self) -> u32 {
        self.next_iteration
    }

    pub fn incumbent(&self) -> &E {
        &self.incumbent
    }

    pub fn store(&self) -> &TrainingExampleStore {
        &self.store
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_done(&self) -> bool {
        self.next_iteration > self.config.controller.num_iters
    }

    /// Run iterations until `num_iters` is reached or a stop is requested.
    pub fn run(&mut self) -> Result<RunSummary, ControllerError> {
        let mut reports = Vec::new();
        let mut stopped_early = false;
        while !self.is_done() {
            if self.stop.is_stop_requested() {
                log::info!("stop requested; halting before iteration {}", self.next_iteration);
                stopped_early = true;
                break;
            }
            match self.run_iteration() {
                Ok(r) => reports.push(r),
                Err(e) => {
                    self.manifest.error = Some(e.to_string());
                    let _ = self.write_manifest();
                    let _ = self.events.flush();
                    return Err(e);
                }
            }
        }
        if !stopped_early {
            self.set_phase(Phase::Done)?;
        }
        self.events.flush()?;
        Ok(RunSummary {
            first_iteration: self.first_iteration,
            iterations: reports,
            stopped_early,
            best_iteration: self.best_iteration,
        })
    }

    /// One full iteration. The iteration counter advances whether or not the candidate is
    /// accepted.
    pub fn run_iteration(&mut self) -> Result<IterationReport, ControllerError> {
        let it = self.next_iteration;
        let num_iters = self.config.controller.num_iters;
        log::info!("iteration {it}/{num_iters}");
        self.manifest.iteration_mut(it);

        // Self-play against the incumbent.
        self.set_phase(Phase::SelfPlaying)?;
        let sp_cfg = SelfPlayConfig {
            seed: game_seed(self.config.selfplay.seed, u64::from(it)),
            ..SelfPlayConfig::from(&self.config)
        };
        let records = SelfPlayEngine::new(self.game, &self.incumbent, sp_cfg)
            .play_games(&self.pool, self.config.selfplay.num_eps as usize)?;
        let games = records.len();
        for r in &records {
            self.events.write_event(&SelfplayGameEventV1 {
                event: "selfplay_game",
                ts_ms: az_logging::now_ms(),
                run_id: self.manifest.run_id.clone(),
                iteration: it,
                game_index: r.game_index as u64,
                seed: r.seed,
                plies: r.plies() as u32,
                outcome: outcome_str(r.outcome),
                examples: r.examples.len() as u64,
            })?;
        }
        let examples: Vec<_> = records.into_iter().flat_map(|r| r.examples).collect();
        let examples_generated = examples.len();
        let appended = self.store.append(it, examples);
        log::info!(
            "self-play: {games} games, {examples_generated} examples; corpus {} in {} batches",
            self.store.len(),
            self.store.num_batches()
        );

        // Train a candidate on the shuffled corpus; the incumbent is left as is.
        self.set_phase(Phase::Training)?;
        let mut corpus = self.store.all_examples();
        corpus.shuffle(&mut ChaCha8Rng::seed_from_u64(
            self.config.training.seed ^ u64::from(it),
        ));
        let params = TrainParams {
            seed: game_seed(self.config.training.seed, u64::from(it)),
            ..TrainParams::from(&self.config.training)
        };
        let candidate = self.incumbent.train(&corpus, &params)?;

        // Gate.
        let (arena, verdict) = if self.config.arena.arena_compare == 0 {
            log::info!("arena disabled; accepting candidate");
            (None, Verdict::Accept)
        } else {
            self.set_phase(Phase::Arenating)?;
            let settings = ArenaSettings {
                seed: game_seed(self.config.selfplay.seed, u64::from(it)),
                ..ArenaSettings::from(&self.config)
            };
            let arena = Arena::new(self.game, settings);
            let result = arena.compare(&self.pool, &self.incumbent, &candidate)?;
            let verdict = arena.decide(&result);
            self.events.write_event(&ArenaEventV1 {
                event: "arena",
                ts_ms: az_logging::now_ms(),
                run_id: self.manifest.run_id.clone(),
                iteration: it,
                games: result.games,
                candidate_wins: result.candidate_wins,
                incumbent_wins: result.incumbent_wins,
                draws: result.draws,
                win_ratio: result.win_ratio(settings.draw_policy),
                threshold: settings.update_threshold,
                draw_policy: settings.draw_policy.as_str(),
                verdict: verdict.as_str(),
            })?;
            (Some(result), verdict)
        };

        let checkpoint = if verdict.is_accept() {
            self.set_phase(Phase::Checkpointing)?;
            let path = save_checkpoint(
                &self.run_dir,
                it,
                self.game.name(),
                &candidate,
                &self.store,
            )?;
            self.incumbent = candidate;
            self.best_iteration = Some(it);
            self.manifest.best_checkpoint = Some(checkpoint_name(it));
            log::info!("iteration {it}: accepted candidate, saved {}", path.display());
            Some(path)
        } else {
            log::info!("iteration {it}: rejected candidate, keeping incumbent");
            None
        };
        save_history(&self.run_dir, it, self.game.name(), &self.store)?;

        let report = IterationReport {
            iteration: it,
            games,
            examples_generated,
            corpus_size: self.store.len(),
            dropped_examples: appended.dropped_examples,
            arena,
            verdict,
            checkpoint,
        };
        self.record_iteration(&report)?;
        self.next_iteration = it + 1;
        self.set_phase(Phase::Idle)?;
        Ok(report)
    }

    fn record_iteration(&mut self, r: &IterationReport) -> Result<(), ControllerError> {
        let draw_policy = self.config.arena.draw_policy;
        let checkpoint = r.checkpoint.as_ref().map(|_| checkpoint_name(r.iteration));

        self.manifest.selfplay_games_completed += r.games as u64;
        self.manifest.last_completed_iteration = Some(r.iteration);
        let summary = self.manifest.iteration_mut(r.iteration);
        summary.ended_ts_ms = Some(az_logging::now_ms());
        summary.games = r.games as u64;
        summary.examples_generated = r.examples_generated as u64;
        summary.corpus_size = r.corpus_size as u64;
        summary.dropped_examples = r.dropped_examples as u64;
        summary.arena = r.arena.map(|a| ArenaSummaryV1 {
            games: a.games,
            candidate_wins: a.candidate_wins,
            incumbent_wins: a.incumbent_wins,
            draws: a.draws,
            win_ratio: a.win_ratio(draw_policy),
        });
        summary.verdict = Some(r.verdict.as_str().to_string());
        summary.checkpoint = checkpoint.clone();

        self.events.write_event(&IterationEventV1 {
            event: "iteration",
            ts_ms: az_logging::now_ms(),
            run_id: self.manifest.run_id.clone(),
            iteration: r.iteration,
            examples_generated: r.examples_generated as u64,
            corpus_size: r.corpus_size as u64,
            corpus_batches: self.store.num_batches() as u64,
            dropped_examples: r.dropped_examples as u64,
            verdict: r.verdict.as_str(),
            checkpoint,
        })?;
        self.events.flush()?;
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase) -> Result<(), ControllerError> {
        self.phase = phase;
        self.manifest.phase = phase.as_str().to_string();
        self.manifest.phase_ts_ms = az_logging::now_ms();
        self.write_manifest()
    }

    fn write_manifest(&self) -> Result<(), ControllerError> {
        az_logging::write_manifest_atomic(self.run_dir.join(RUN_MANIFEST), &self.manifest)?;
        Ok(())
    }
}

fn outcome_str(o: Outcome) -> &'static str {
    match o {
        Outcome::Win(p) => p.as_str(),
        Outcome::Draw => "draw",
    }
}

/// Open `run.json` in `run_dir`, creating it on first use, and record the config snapshot.
fn ensure_manifest(
    run_dir: &Path,
    config: &Config,
    game: &str,
) -> Result<RunManifestV1, ControllerError> {
    let run_json = run_dir.join(RUN_MANIFEST);
    let mut m = if run_json.exists() {
        az_logging::read_manifest(&run_json)?
    } else {
        let run_id = run_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("run")
            .to_string();
        RunManifestV1::new(run_id, game)
    };

    let yaml = config.to_yaml()?;
    std::fs::write(run_dir.join(CONFIG_SNAPSHOT), &yaml)?;
    m.config_hash = Some(az_logging::hash_config_bytes(yaml.as_bytes()));
    m.phase = Phase::Idle.as_str().to_string();
    m.error = None;
    az_logging::write_manifest_atomic(&run_json, &m)?;
    Ok(m)
}
