//! One self-play game: search every ply, pick a move, back-fill outcome targets at the end.

use az_core::{Game, GameError, Outcome, Player};
use az_mcts::{apply_temperature, Evaluator, Mcts, MctsConfig, SearchError};
use az_replay::TrainingExample;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use thiserror::Error;

use crate::pool::{PoolError, WorkerPool};
use crate::seed::game_seed;

#[derive(Debug, Error)]
pub enum SelfPlayError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Clone, Copy, Debug)]
pub struct SelfPlayConfig {
    pub mcts: MctsConfig,
    /// Plies `< temp_threshold` sample from the visit distribution; later plies play argmax.
    pub temp_threshold: u32,
    pub seed: u64,
}

impl From<&az_core::Config> for SelfPlayConfig {
    fn from(c: &az_core::Config) -> Self {
        Self {
            mcts: MctsConfig::from(&c.mcts),
            temp_threshold: c.selfplay.temp_threshold,
            seed: c.selfplay.seed,
        }
    }
}

/// A finished game and the training examples it produced.
#[derive(Clone, Debug)]
pub struct GameRecord {
    pub game_index: usize,
    pub seed: u64,
    pub actions: Vec<usize>,
    pub outcome: Outcome,
    /// One entry per ply per symmetry, in ply order.
    pub examples: Vec<TrainingExample>,
}

impl GameRecord {
    pub fn plies(&self) -> usize {
        self.actions.len()
    }
}

struct PendingSample {
    features: Vec<f32>,
    pi: Vec<f32>,
    mover: Player,
}

pub struct SelfPlayEngine<'a, G: Game, E: Evaluator + ?Sized> {
    game: &'a G,
    evaluator: &'a E,
    cfg: SelfPlayConfig,
}

impl<'a, G: Game, E: Evaluator + ?Sized> SelfPlayEngine<'a, G, E> {
    pub fn new(game: &'a G, evaluator: &'a E, cfg: SelfPlayConfig) -> Self {
        Self {
            game,
            evaluator,
            cfg,
        }
    }

    /// Play game `game_index` from the initial state to the end.
    ///
    /// The game's randomness depends only on the base seed and `game_index`.
    pub fn play_one_game(&self, game_index: usize) -> Result<GameRecord, SelfPlayError> {
        let game = self.game;
        let seed = game_seed(self.cfg.seed, game_index as u64);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut mcts = Mcts::new(self.cfg.mcts)?;

        let mut state = game.initial_state();
        let mut traj: Vec<PendingSample> = Vec::new();
        let mut actions = Vec::new();
        let mut ply: u32 = 0;

        let outcome = loop {
            if let Some(o) = game.outcome(&state) {
                break o;
            }
            let sr = mcts.search(game, &state, self.evaluator, &mut rng)?;

            // Executed move only; the stored target stays the raw visit distribution.
            let legal = game.legal_mask(&state);
            let t = if ply < self.cfg.temp_threshold { 1.0 } else { 0.0 };
            let exec_pi = apply_temperature(&sr.pi, &legal, t);
            let action = if t == 0.0 {
                argmax(&exec_pi)
            } else {
                sample(&exec_pi, &mut rng)
            };

            traj.push(PendingSample {
                features: game.encode(&state),
                pi: sr.pi,
                mover: game.to_play(&state),
            });
            state = game.apply(&state, action)?;
            actions.push(action);
            ply += 1;
        };

        // Terminal z for each recorded mover, then symmetry augmentation.
        let mut examples = Vec::with_capacity(traj.len());
        for ps in traj {
            let z = outcome.value_for(ps.mover).value;
            for (features, pi) in game.symmetries(&ps.features, &ps.pi) {
                examples.push(TrainingExample::new(features, pi, z));
            }
        }

        log::debug!(
            "selfplay game {game_index}: {} plies, outcome {:?}, {} examples",
            actions.len(),
            outcome,
            examples.len()
        );
        Ok(GameRecord {
            game_index,
            seed,
            actions,
            outcome,
            examples,
        })
    }

    /// Play games `0..n` on `pool`; records come back in game-index order.
    pub fn play_games(
        &self,
        pool: &WorkerPool,
        n: usize,
    ) -> Result<Vec<GameRecord>, SelfPlayError> {
        pool.run_indexed(n, |i| self.play_one_game(i))
    }
}

fn argmax(p: &[f32]) -> usize {
    let mut best_i = 0usize;
    let mut best_v = f32::NEG_INFINITY;
    for (i, &v) in p.iter().enumerate() {
        if v > best_v {
            best_v = v;
            best_i = i;
        }
    }
    best_i
}

fn sample<R: Rng + ?Sized>(p: &[f32], rng: &mut R) -> usize {
    let r: f32 = rng.gen::<f32>(); // [0,1)
    let mut acc = 0.0f32;
    for (i, &v) in p.iter().enumerate() {
        if v <= 0.0 {
            continue;
        }
        acc += v;
        if r < acc {
            return i;
        }
    }
    // Numeric edge case: fallback to argmax.
    argmax(p)
}
