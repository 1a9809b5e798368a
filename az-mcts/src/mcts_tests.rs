use az_core::{Board, Game, GameError, Outcome, Player, StateKey, TicTacToe};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    apply_temperature, Evaluation, EvaluationError, Evaluator, Mcts, MctsConfig, SearchError,
    UniformEvaluator,
};

fn cfg(simulations: u32) -> MctsConfig {
    MctsConfig {
        c_puct: 2.0,
        simulations,
        reuse_tree: false,
        dirichlet_alpha: 0.3,
        dirichlet_epsilon: 0.0,
    }
}

fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(0)
}

#[test]
fn pi_is_valid_distribution_and_respects_legality() {
    let g = TicTacToe;
    let root = Board::parse("x...o....").unwrap();
    let legal = g.legal_mask(&root);

    for sims in [1u32, 2, 5, 64] {
        let mut mcts = Mcts::new(cfg(sims)).unwrap();
        let res = mcts
            .search(&g, &root, &UniformEvaluator, &mut rng())
            .unwrap();
        assert_eq!(res.pi.len(), 9);
        let mut sum = 0.0f32;
        for a in 0..9 {
            if legal[a] {
                assert!(res.pi[a].is_finite());
                assert!(res.pi[a] >= 0.0);
                sum += res.pi[a];
            } else {
                assert_eq!(res.pi[a], 0.0);
            }
        }
        assert!((sum - 1.0).abs() < 1e-5, "sims={sims} sum={sum}");
        assert_eq!(res.stats.simulations, sims);
    }
}

#[test]
fn single_legal_action_is_one_hot_with_budget_one() {
    let g = TicTacToe;
    let root = Board::parse("xoxxooox.").unwrap();
    assert_eq!(g.legal_actions(&root), vec![8]);

    let mut mcts = Mcts::new(cfg(1)).unwrap();
    let res = mcts
        .search(&g, &root, &UniformEvaluator, &mut rng())
        .unwrap();
    let mut expected = vec![0.0f32; 9];
    expected[8] = 1.0;
    assert_eq!(res.pi, expected);
    assert_eq!(res.best_action(), Some(8));
}

#[test]
fn terminal_root_is_an_error() {
    let g = TicTacToe;
    let root = Board::parse("xxxoo....").unwrap();
    let mut mcts = Mcts::new(cfg(8)).unwrap();
    let err = mcts
        .search(&g, &root, &UniformEvaluator, &mut rng())
        .unwrap_err();
    assert!(matches!(err, SearchError::TerminalRoot));
}

#[test]
fn search_is_deterministic() {
    let g = TicTacToe;
    let root = g.initial_state();
    let mut m1 = Mcts::new(cfg(128)).unwrap();
    let mut m2 = Mcts::new(cfg(128)).unwrap();
    let r1 = m1.search(&g, &root, &UniformEvaluator, &mut rng()).unwrap();
    let r2 = m2.search(&g, &root, &UniformEvaluator, &mut rng()).unwrap();
    assert_eq!(r1.pi, r2.pi);
    assert_eq!(r1.root_value, r2.root_value);
}

#[test]
fn finds_immediate_win() {
    let g = TicTacToe;
    // x to move; 2 completes the top row, o threatens 5.
    let root = Board::parse("xx.oo....").unwrap();
    let mut mcts = Mcts::new(cfg(300)).unwrap();
    let res = mcts
        .search(&g, &root, &UniformEvaluator, &mut rng())
        .unwrap();
    assert_eq!(res.best_action(), Some(2));
    assert!(res.root_value > 0.0);
    assert!(res.stats.terminal_hits > 0);
}

#[test]
fn blocks_opponent_threat_when_no_win_is_available() {
    let g = TicTacToe;
    // o to move; x threatens 2 on the top row.
    let root = Board::parse("xx..o....").unwrap();
    assert_eq!(g.to_play(&root), Player::Second);
    let mut mcts = Mcts::new(cfg(800)).unwrap();
    let res = mcts
        .search(&g, &root, &UniformEvaluator, &mut rng())
        .unwrap();
    assert_eq!(res.best_action(), Some(2));
}

#[test]
fn priors_guide_first_simulation() {
    struct Prefer(usize);
    impl Evaluator for Prefer {
        fn evaluate(&self, _f: &[f32], legal: &[bool]) -> Result<Evaluation, EvaluationError> {
            let mut policy = vec![0.0f32; legal.len()];
            if legal[self.0] {
                policy[self.0] = 1.0;
            } else {
                let k = legal.iter().filter(|&&ok| ok).count() as f32;
                for (p, &ok) in policy.iter_mut().zip(legal) {
                    if ok {
                        *p = 1.0 / k;
                    }
                }
            }
            Ok(Evaluation { policy, value: 0.0 })
        }
    }

    let g = TicTacToe;
    let mut mcts = Mcts::new(cfg(1)).unwrap();
    let res = mcts
        .search(&g, &g.initial_state(), &Prefer(4), &mut rng())
        .unwrap();
    assert_eq!(res.best_action(), Some(4));
    assert_eq!(res.root_priors[4], 1.0);
}

struct Broken(Evaluation);

impl Evaluator for Broken {
    fn evaluate(&self, _f: &[f32], _legal: &[bool]) -> Result<Evaluation, EvaluationError> {
        Ok(self.0.clone())
    }
}

#[test]
fn malformed_evaluator_output_aborts_search() {
    let g = TicTacToe;
    let root = g.initial_state();

    let cases = [
        Broken(Evaluation {
            policy: vec![0.2; 9],
            value: 0.0,
        }),
        Broken(Evaluation {
            policy: vec![1.0 / 3.0; 3],
            value: 0.0,
        }),
        Broken(Evaluation {
            policy: vec![1.0 / 9.0; 9],
            value: 2.0,
        }),
    ];
    for bad in &cases {
        let mut mcts = Mcts::new(cfg(4)).unwrap();
        let err = mcts.search(&g, &root, bad, &mut rng()).unwrap_err();
        assert!(matches!(err, SearchError::Evaluation(_)), "{err:?}");
    }
}

#[test]
fn all_mass_on_illegal_moves_is_an_error() {
    let g = TicTacToe;
    let root = g.apply(&g.initial_state(), 0).unwrap();
    let mut policy = vec![0.0f32; 9];
    policy[0] = 1.0;
    let mut mcts = Mcts::new(cfg(4)).unwrap();
    let err = mcts
        .search(&g, &root, &Broken(Evaluation { policy, value: 0.0 }), &mut rng())
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::Evaluation(EvaluationError::NoLegalMass)
    ));
}

#[test]
fn tree_is_reused_until_reset() {
    let g = TicTacToe;
    let s0 = g.initial_state();
    let mut c = cfg(64);
    c.reuse_tree = true;
    let mut mcts = Mcts::new(c).unwrap();

    let r0 = mcts.search(&g, &s0, &UniformEvaluator, &mut rng()).unwrap();
    let a = r0.best_action().unwrap();
    let after_first = mcts.node_count();
    assert!(after_first > 1);

    let s1 = g.apply(&s0, a).unwrap();
    let r1 = mcts.search(&g, &s1, &UniformEvaluator, &mut rng()).unwrap();
    // The child was already expanded, so the second search starts with existing visits.
    assert!(mcts.node_count() >= after_first);
    assert!((r1.pi.iter().sum::<f32>() - 1.0).abs() < 1e-5);

    mcts.reset();
    assert_eq!(mcts.node_count(), 0);
}

#[test]
fn root_noise_changes_priors_but_keeps_a_distribution() {
    let g = TicTacToe;
    let root = g.initial_state();
    let mut c = cfg(16);
    c.dirichlet_epsilon = 0.25;

    let mut m1 = Mcts::new(c).unwrap();
    let mut m2 = Mcts::new(c).unwrap();
    let r1 = m1
        .search(&g, &root, &UniformEvaluator, &mut ChaCha8Rng::seed_from_u64(42))
        .unwrap();
    let r2 = m2
        .search(&g, &root, &UniformEvaluator, &mut ChaCha8Rng::seed_from_u64(42))
        .unwrap();

    assert_eq!(r1.root_priors, r2.root_priors);
    assert!((r1.root_priors.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    assert!(r1.root_priors.iter().any(|&p| (p - 1.0 / 9.0).abs() > 1e-4));
}

#[test]
fn invalid_config_is_rejected() {
    assert!(Mcts::new(cfg(0)).is_err());
    let mut c = cfg(1);
    c.c_puct = f32::NAN;
    assert!(Mcts::new(c).is_err());
    let mut c = cfg(1);
    c.dirichlet_epsilon = 1.5;
    assert!(Mcts::new(c).is_err());
}

#[test]
fn temperature_zero_is_argmax_with_lowest_index_tie_break() {
    let pi = [0.1, 0.4, 0.4, 0.1];
    let legal = [true; 4];
    assert_eq!(apply_temperature(&pi, &legal, 0.0), vec![0.0, 1.0, 0.0, 0.0]);

    let legal = [true, false, true, true];
    assert_eq!(apply_temperature(&pi, &legal, 0.0), vec![0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn temperature_one_is_identity_and_small_t_sharpens() {
    let pi = [0.25, 0.75];
    let legal = [true, true];
    let out = apply_temperature(&pi, &legal, 1.0);
    assert!((out[0] - 0.25).abs() < 1e-6);
    let sharp = apply_temperature(&pi, &legal, 0.5);
    assert!(sharp[1] > 0.75);
    assert!((sharp.iter().sum::<f32>() - 1.0).abs() < 1e-6);
}

/// Two open positions that lead back into each other, plus an exit that wins for the mover.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Loop {
    Open { at: u8, to_move: Player },
    Won(Player),
}

struct LoopGame;

impl Game for LoopGame {
    type State = Loop;

    fn name(&self) -> &'static str {
        "loop"
    }

    fn action_space(&self) -> usize {
        2
    }

    fn initial_state(&self) -> Loop {
        Loop::Open {
            at: 0,
            to_move: Player::First,
        }
    }

    fn to_play(&self, s: &Loop) -> Player {
        match *s {
            Loop::Open { to_move, .. } => to_move,
            Loop::Won(p) => p.other(),
        }
    }

    fn legal_actions(&self, s: &Loop) -> Vec<usize> {
        match s {
            Loop::Open { .. } => vec![0, 1],
            Loop::Won(_) => vec![],
        }
    }

    fn apply(&self, s: &Loop, action: usize) -> Result<Loop, GameError> {
        match (*s, action) {
            (Loop::Open { at, to_move }, 0) => Ok(Loop::Open {
                at: 1 - at,
                to_move: to_move.other(),
            }),
            (Loop::Open { to_move, .. }, 1) => Ok(Loop::Won(to_move)),
            (Loop::Open { .. }, a) => Err(GameError::IllegalAction { action: a }),
            (Loop::Won(_), _) => Err(GameError::Finished),
        }
    }

    fn outcome(&self, s: &Loop) -> Option<Outcome> {
        match *s {
            Loop::Won(p) => Some(Outcome::Win(p)),
            Loop::Open { .. } => None,
        }
    }

    fn state_key(&self, s: &Loop) -> StateKey {
        match *s {
            Loop::Open { at, to_move } => (at as u64) * 2 + to_move.index() as u64,
            Loop::Won(p) => 10 + p.index() as u64,
        }
    }

    fn encode(&self, _s: &Loop) -> Vec<f32> {
        vec![]
    }
}

/// Prefers the looping move.
struct LoopLover;

impl Evaluator for LoopLover {
    fn evaluate(&self, _f: &[f32], _legal: &[bool]) -> Result<Evaluation, EvaluationError> {
        Ok(Evaluation {
            policy: vec![0.7, 0.3],
            value: 0.0,
        })
    }
}

#[test]
fn revisiting_a_position_on_the_path_is_cut_off() {
    let g = LoopGame;
    let mut mcts = Mcts::new(cfg(50)).unwrap();
    let res = mcts
        .search(&g, &g.initial_state(), &LoopLover, &mut rng())
        .unwrap();
    assert!(res.stats.cycle_cutoffs > 0);
    // Winning immediately still dominates once explored.
    assert_eq!(res.best_action(), Some(1));
}
