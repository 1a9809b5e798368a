//! Candidate vs incumbent games.

use az_core::{DrawPolicy, Game, GameError, Outcome, Player};
use az_mcts::{apply_temperature, Evaluator, Mcts, MctsConfig, SearchError};
use az_runtime::{game_seed, PoolError, WorkerPool};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use thiserror::Error;

use crate::result::{decide, ArenaResult, GameResult, Verdict};

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSpec {
    pub index: u32,
    pub candidate_first: bool,
}

/// Alternate the first mover: the candidate starts every even-indexed game.
pub fn arena_schedule(games: u32) -> Vec<GameSpec> {
    (0..games)
        .map(|index| GameSpec {
            index,
            candidate_first: index % 2 == 0,
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct ArenaSettings {
    /// Search settings for both sides; root noise is always off in the arena.
    pub mcts: MctsConfig,
    pub games: u32,
    pub update_threshold: f64,
    pub draw_policy: DrawPolicy,
    pub seed: u64,
}

impl From<&az_core::Config> for ArenaSettings {
    fn from(c: &az_core::Config) -> Self {
        Self {
            mcts: MctsConfig::from(&c.mcts),
            games: c.arena.arena_compare,
            update_threshold: c.arena.update_threshold,
            draw_policy: c.arena.draw_policy,
            seed: c.selfplay.seed,
        }
    }
}

pub struct Arena<'a, G: Game> {
    game: &'a G,
    settings: ArenaSettings,
}

impl<'a, G: Game> Arena<'a, G> {
    pub fn new(game: &'a G, mut settings: ArenaSettings) -> Self {
        settings.mcts.dirichlet_epsilon = 0.0;
        Self { game, settings }
    }

    pub fn settings(&self) -> &ArenaSettings {
        &self.settings
    }

    /// Play `settings.games` games on `pool` and tally them from the candidate's side.
    pub fn compare<I, C>(
        &self,
        pool: &WorkerPool,
        incumbent: &I,
        candidate: &C,
    ) -> Result<ArenaResult, ArenaError>
    where
        I: Evaluator + ?Sized,
        C: Evaluator + ?Sized,
    {
        let schedule = arena_schedule(self.settings.games);
        let results = pool.run_indexed(schedule.len(), |i| {
            self.play_game(schedule[i], incumbent, candidate)
        })?;

        let mut tally = ArenaResult::default();
        for r in results {
            tally.record(r);
        }
        log::info!(
            "arena: candidate {} / incumbent {} / draws {} over {} games",
            tally.candidate_wins,
            tally.incumbent_wins,
            tally.draws,
            tally.games
        );
        Ok(tally)
    }

    pub fn decide(&self, result: &ArenaResult) -> Verdict {
        decide(
            result,
            self.settings.update_threshold,
            self.settings.draw_policy,
        )
    }

    /// One game with a fresh tree per side; both sides play the most visited move.
    pub fn play_game<I, C>(
        &self,
        spec: GameSpec,
        incumbent: &I,
        candidate: &C,
    ) -> Result<GameResult, ArenaError>
    where
        I: Evaluator + ?Sized,
        C: Evaluator + ?Sized,
    {
        let game = self.game;
        let candidate_seat = if spec.candidate_first {
            Player::First
        } else {
            Player::Second
        };
        let seed = game_seed(self.settings.seed, spec.index as u64);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut cand_mcts = Mcts::new(self.settings.mcts)?;
        let mut inc_mcts = Mcts::new(self.settings.mcts)?;

        let mut state = game.initial_state();
        let outcome = loop {
            if let Some(o) = game.outcome(&state) {
                break o;
            }
            let sr = if game.to_play(&state) == candidate_seat {
                cand_mcts.search(game, &state, candidate, &mut rng)?
            } else {
                inc_mcts.search(game, &state, incumbent, &mut rng)?
            };
            let legal = game.legal_mask(&state);
            let exec = apply_temperature(&sr.pi, &legal, 0.0);
            let action = exec
                .iter()
                .position(|&p| p > 0.0)
                .ok_or(SearchError::NoLegalActions)?;
            state = game.apply(&state, action)?;
        };

        Ok(match outcome {
            Outcome::Win(p) if p == candidate_seat => GameResult::CandidateWin,
            Outcome::Win(_) => GameResult::IncumbentWin,
            Outcome::Draw => GameResult::Draw,
        })
    }
}
