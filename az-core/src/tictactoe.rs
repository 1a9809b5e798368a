//! Tic-tac-toe: the bundled reference game used by the CLI and the test suites.

use crate::game::{Game, GameError, StateKey};
use crate::player::{Outcome, Player};

pub const CELLS: usize = 9;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    pub cells: [Option<Player>; CELLS],
    pub to_move: Player,
}

impl Board {
    pub fn empty() -> Self {
        Self {
            cells: [None; CELLS],
            to_move: Player::First,
        }
    }

    /// Parse a 9-char board (`x`, `o`, `.`), row-major. Side to move is derived from stone counts.
    pub fn parse(s: &str) -> Option<Self> {
        let mut b = Self::empty();
        let mut n_x = 0usize;
        let mut n_o = 0usize;
        let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.len() != CELLS {
            return None;
        }
        for (i, ch) in chars.into_iter().enumerate() {
            b.cells[i] = match ch {
                'x' | 'X' => {
                    n_x += 1;
                    Some(Player::First)
                }
                'o' | 'O' => {
                    n_o += 1;
                    Some(Player::Second)
                }
                '.' | '-' => None,
                _ => return None,
            };
        }
        b.to_move = match n_x.checked_sub(n_o)? {
            0 => Player::First,
            1 => Player::Second,
            _ => return None,
        };
        Some(b)
    }

    fn winner(&self) -> Option<Player> {
        LINES.iter().find_map(|l| {
            let a = self.cells[l[0]]?;
            (self.cells[l[1]] == Some(a) && self.cells[l[2]] == Some(a)).then_some(a)
        })
    }

    fn is_full(&self) -> bool {
        self.cells.iter().all(|c| c.is_some())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToe;

impl Game for TicTacToe {
    type State = Board;

    fn name(&self) -> &'static str {
        "tictactoe"
    }

    fn action_space(&self) -> usize {
        CELLS
    }

    fn initial_state(&self) -> Board {
        Board::empty()
    }

    fn to_play(&self, state: &Board) -> Player {
        state.to_move
    }

    fn legal_actions(&self, state: &Board) -> Vec<usize> {
        if self.outcome(state).is_some() {
            return Vec::new();
        }
        (0..CELLS).filter(|&i| state.cells[i].is_none()).collect()
    }

    fn apply(&self, state: &Board, action: usize) -> Result<Board, GameError> {
        if self.outcome(state).is_some() {
            return Err(GameError::Finished);
        }
        if action >= CELLS || state.cells[action].is_some() {
            return Err(GameError::IllegalAction { action });
        }
        let mut next = *state;
        next.cells[action] = Some(state.to_move);
        next.to_move = state.to_move.other();
        Ok(next)
    }

    fn outcome(&self, state: &Board) -> Option<Outcome> {
        if let Some(p) = state.winner() {
            return Some(Outcome::Win(p));
        }
        state.is_full().then_some(Outcome::Draw)
    }

    fn state_key(&self, state: &Board) -> StateKey {
        // Base-3 digits per cell, side to move in the top bit.
        let mut k: u64 = 0;
        for c in state.cells.iter().rev() {
            let d = match c {
                None => 0,
                Some(Player::First) => 1,
                Some(Player::Second) => 2,
            };
            k = k * 3 + d;
        }
        k | ((state.to_move.index() as u64) << 63)
    }

    fn encode(&self, state: &Board) -> Vec<f32> {
        // Plane 0: mover's stones, plane 1: opponent's stones.
        let me = state.to_move;
        let mut out = vec![0.0f32; 2 * CELLS];
        for (i, c) in state.cells.iter().enumerate() {
            match c {
                Some(p) if *p == me => out[i] = 1.0,
                Some(_) => out[CELLS + i] = 1.0,
                None => {}
            }
        }
        out
    }

    fn symmetries(&self, features: &[f32], pi: &[f32]) -> Vec<(Vec<f32>, Vec<f32>)> {
        if features.len() != 2 * CELLS || pi.len() != CELLS {
            return vec![(features.to_vec(), pi.to_vec())];
        }
        dihedral_perms()
            .iter()
            .map(|perm| {
                let mut f = vec![0.0f32; 2 * CELLS];
                let mut p = vec![0.0f32; CELLS];
                for (src, &dst) in perm.iter().enumerate() {
                    f[dst] = features[src];
                    f[CELLS + dst] = features[CELLS + src];
                    p[dst] = pi[src];
                }
                (f, p)
            })
            .collect()
    }
}

/// The 8 symmetries of the square as cell permutations (`perm[src] = dst`), identity first.
fn dihedral_perms() -> [[usize; CELLS]; 8] {
    let mut out = [[0usize; CELLS]; 8];
    for (k, perm) in out.iter_mut().enumerate() {
        for (src, dst) in perm.iter_mut().enumerate() {
            let (mut r, mut c) = (src / 3, src % 3);
            for _ in 0..(k % 4) {
                (r, c) = (c, 2 - r);
            }
            if k >= 4 {
                c = 2 - c;
            }
            *dst = r * 3 + c;
        }
    }
    out
}
