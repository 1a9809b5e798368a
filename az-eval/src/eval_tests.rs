use az_core::{DrawPolicy, Game, GameError, Outcome, Player, StateKey, TicTacToe};
use az_mcts::{Evaluation, EvaluationError, Evaluator, MctsConfig, UniformEvaluator};
use az_runtime::WorkerPool;

use crate::{arena_schedule, decide, Arena, ArenaError, ArenaResult, ArenaSettings, Verdict};

fn settings(games: u32) -> ArenaSettings {
    ArenaSettings {
        mcts: MctsConfig {
            c_puct: 2.0,
            simulations: 16,
            reuse_tree: true,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.25,
        },
        games,
        update_threshold: 0.6,
        draw_policy: DrawPolicy::Exclude,
        seed: 1,
    }
}

#[test]
fn ratio_exactly_at_threshold_accepts() {
    let r = ArenaResult::new(6, 4, 0);
    assert_eq!(decide(&r, 0.6, DrawPolicy::Exclude), Verdict::Accept);
}

#[test]
fn even_split_rejects_at_point_six() {
    let r = ArenaResult::new(5, 5, 0);
    assert_eq!(decide(&r, 0.6, DrawPolicy::Exclude), Verdict::Reject);
}

#[test]
fn just_below_threshold_rejects() {
    let r = ArenaResult::new(599, 401, 0);
    assert_eq!(decide(&r, 0.6, DrawPolicy::Exclude), Verdict::Reject);
    let r = ArenaResult::new(600, 400, 0);
    assert_eq!(decide(&r, 0.6, DrawPolicy::Exclude), Verdict::Accept);
}

#[test]
fn all_draws_reject_regardless_of_threshold() {
    let r = ArenaResult::new(0, 0, 20);
    assert_eq!(r.win_ratio(DrawPolicy::Exclude), None);
    for t in [0.0, 0.5, 1.0] {
        assert_eq!(decide(&r, t, DrawPolicy::Exclude), Verdict::Reject);
    }
}

#[test]
fn draws_do_not_enter_the_excluding_ratio() {
    // 6 wins, 4 losses, 10 draws: 0.6 excluding draws, 0.55 counting them as halves.
    let r = ArenaResult::new(6, 4, 10);
    assert_eq!(r.games, 20);
    assert_eq!(decide(&r, 0.6, DrawPolicy::Exclude), Verdict::Accept);
    assert_eq!(r.win_ratio(DrawPolicy::Half), Some(0.55));
    assert_eq!(decide(&r, 0.6, DrawPolicy::Half), Verdict::Reject);
}

#[test]
fn merge_sums_tallies() {
    let mut a = ArenaResult::new(1, 2, 3);
    a.merge(&ArenaResult::new(4, 5, 6));
    assert_eq!(a, ArenaResult::new(5, 7, 9));
    assert_eq!(a.games, 21);
}

#[test]
fn schedule_alternates_first_mover() {
    let s = arena_schedule(5);
    assert_eq!(s.len(), 5);
    let firsts: Vec<bool> = s.iter().map(|g| g.candidate_first).collect();
    assert_eq!(firsts, vec![true, false, true, false, true]);
}

/// One move; whoever moves first wins.
struct FirstMoverWins;

impl Game for FirstMoverWins {
    type State = bool;

    fn name(&self) -> &'static str {
        "first_mover_wins"
    }

    fn action_space(&self) -> usize {
        1
    }

    fn initial_state(&self) -> bool {
        false
    }

    fn to_play(&self, _s: &bool) -> Player {
        Player::First
    }

    fn legal_actions(&self, s: &bool) -> Vec<usize> {
        if *s {
            vec![]
        } else {
            vec![0]
        }
    }

    fn apply(&self, s: &bool, action: usize) -> Result<bool, GameError> {
        match (*s, action) {
            (true, _) => Err(GameError::Finished),
            (false, 0) => Ok(true),
            (false, a) => Err(GameError::IllegalAction { action: a }),
        }
    }

    fn outcome(&self, s: &bool) -> Option<Outcome> {
        s.then_some(Outcome::Win(Player::First))
    }

    fn state_key(&self, s: &bool) -> StateKey {
        *s as u64
    }

    fn encode(&self, _s: &bool) -> Vec<f32> {
        vec![]
    }
}

#[test]
fn candidate_moves_first_in_even_games() {
    let g = FirstMoverWins;
    let arena = Arena::new(&g, settings(4));
    let pool = WorkerPool::new(2).unwrap();
    let r = arena
        .compare(&pool, &UniformEvaluator, &UniformEvaluator)
        .unwrap();
    assert_eq!(r, ArenaResult::new(2, 2, 0));
    assert_eq!(arena.decide(&r), Verdict::Reject);
}

#[test]
fn tictactoe_arena_plays_every_game_deterministically() {
    let g = TicTacToe;
    let arena = Arena::new(&g, settings(6));
    assert_eq!(arena.settings().mcts.dirichlet_epsilon, 0.0);
    let pool = WorkerPool::new(3).unwrap();

    let r1 = arena
        .compare(&pool, &UniformEvaluator, &UniformEvaluator)
        .unwrap();
    let r2 = arena
        .compare(&pool, &UniformEvaluator, &UniformEvaluator)
        .unwrap();
    assert_eq!(r1.games, 6);
    assert_eq!(r1, r2);
}

struct Broken;

impl Evaluator for Broken {
    fn evaluate(&self, _f: &[f32], legal: &[bool]) -> Result<Evaluation, EvaluationError> {
        Ok(Evaluation {
            policy: vec![0.0; legal.len()],
            value: 0.0,
        })
    }
}

#[test]
fn broken_candidate_fails_the_arena() {
    let g = TicTacToe;
    let arena = Arena::new(&g, settings(2));
    let pool = WorkerPool::new(1).unwrap();
    let err = arena
        .compare(&pool, &UniformEvaluator, &Broken)
        .unwrap_err();
    assert!(matches!(err, ArenaError::Search(_)));
}
