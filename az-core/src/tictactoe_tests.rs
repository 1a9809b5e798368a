use std::collections::HashSet;

use crate::{Board, Game, GameError, Outcome, Player, TicTacToe};

#[test]
fn initial_state_has_nine_legal_moves_and_first_to_play() {
    let g = TicTacToe;
    let s = g.initial_state();
    assert_eq!(g.legal_actions(&s), (0..9).collect::<Vec<_>>());
    assert_eq!(g.to_play(&s), Player::First);
    assert_eq!(g.outcome(&s), None);
}

#[test]
fn apply_returns_new_state_and_leaves_input_untouched() {
    let g = TicTacToe;
    let s0 = g.initial_state();
    let s1 = g.apply(&s0, 4).unwrap();
    assert_eq!(s0, Board::empty());
    assert_eq!(s1.cells[4], Some(Player::First));
    assert_eq!(g.to_play(&s1), Player::Second);
}

#[test]
fn occupied_cell_is_illegal() {
    let g = TicTacToe;
    let s = g.apply(&g.initial_state(), 0).unwrap();
    assert_eq!(g.apply(&s, 0), Err(GameError::IllegalAction { action: 0 }));
    assert_eq!(g.apply(&s, 9), Err(GameError::IllegalAction { action: 9 }));
}

#[test]
fn row_completes_a_win() {
    let g = TicTacToe;
    let s = Board::parse("xx.oo....").unwrap();
    assert_eq!(g.to_play(&s), Player::First);
    let s = g.apply(&s, 2).unwrap();
    assert_eq!(g.outcome(&s), Some(Outcome::Win(Player::First)));
    assert!(g.legal_actions(&s).is_empty());
    assert_eq!(g.apply(&s, 5), Err(GameError::Finished));
}

#[test]
fn full_board_without_line_is_draw() {
    let g = TicTacToe;
    let s = Board::parse("xoxxoxoxo").unwrap();
    assert_eq!(g.outcome(&s), Some(Outcome::Draw));
}

#[test]
fn state_keys_are_distinct_for_distinct_positions() {
    let g = TicTacToe;
    let mut seen = HashSet::new();
    let s0 = g.initial_state();
    assert!(seen.insert(g.state_key(&s0)));
    for a in 0..9 {
        let s1 = g.apply(&s0, a).unwrap();
        assert!(seen.insert(g.state_key(&s1)));
        for b in g.legal_actions(&s1) {
            let s2 = g.apply(&s1, b).unwrap();
            seen.insert(g.state_key(&s2));
        }
    }
    // 1 + 9 + 9*8 distinct positions.
    assert_eq!(seen.len(), 1 + 9 + 72);
}

#[test]
fn encode_is_from_movers_point_of_view() {
    let g = TicTacToe;
    let s = g.apply(&g.initial_state(), 0).unwrap();
    let f = g.encode(&s);
    assert_eq!(f.len(), 18);
    // Second player to move: the x in cell 0 is an opponent stone.
    assert_eq!(f[0], 0.0);
    assert_eq!(f[9], 1.0);
}

#[test]
fn symmetries_are_eight_distinct_permutations_with_identity_first() {
    let g = TicTacToe;
    let s = Board::parse("x...o....").unwrap();
    let f = g.encode(&s);
    let mut pi = vec![0.0f32; 9];
    pi[1] = 1.0;

    let syms = g.symmetries(&f, &pi);
    assert_eq!(syms.len(), 8);
    assert_eq!(syms[0].0, f);
    assert_eq!(syms[0].1, pi);

    let distinct: HashSet<usize> = syms
        .iter()
        .map(|(_, p)| p.iter().position(|&v| v == 1.0).unwrap())
        .collect();
    // An edge cell maps onto the 4 edge cells.
    assert_eq!(distinct, HashSet::from([1, 3, 5, 7]));
    for (feat, p) in &syms {
        assert_eq!(feat.iter().sum::<f32>(), 2.0);
        assert_eq!(p.iter().sum::<f32>(), 1.0);
        // The centre stone is fixed by every symmetry.
        assert_eq!(feat[9 + 4], 1.0);
    }
}

#[test]
fn parse_rejects_impossible_counts() {
    assert!(Board::parse("xx.......").is_none());
    assert!(Board::parse("o........").is_none());
    assert!(Board::parse("x..").is_none());
}
