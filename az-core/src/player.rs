//! Players, terminal outcomes and values tagged with the player they belong to.

use serde::{Deserialize, Serialize};

/// One of the two seats of a two-player game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    First,
    Second,
}

impl Player {
    pub fn other(self) -> Self {
        match self {
            Player::First => Player::Second,
            Player::Second => Player::First,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Player::First => 0,
            Player::Second => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Player::First => "first",
            Player::Second => "second",
        }
    }
}

/// Result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win(Player),
    Draw,
}

impl Outcome {
    pub fn winner(self) -> Option<Player> {
        match self {
            Outcome::Win(p) => Some(p),
            Outcome::Draw => None,
        }
    }

    /// Terminal value from `player`'s point of view: +1 win, -1 loss, 0 draw.
    pub fn value_for(self, player: Player) -> PlayerValue {
        PlayerValue::from_outcome(self).for_player(player)
    }
}

/// A scalar value in `[-1, 1]` that carries the player whose point of view it expresses.
///
/// Search backups and self-play targets convert with [`PlayerValue::for_player`] instead of
/// flipping signs by ply parity, so games where a player moves twice in a row stay correct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerValue {
    pub player: Player,
    pub value: f32,
}

impl PlayerValue {
    pub fn new(player: Player, value: f32) -> Self {
        Self { player, value }
    }

    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win(p) => Self::new(p, 1.0),
            Outcome::Draw => Self::new(Player::First, 0.0),
        }
    }

    /// The same value seen from `player`'s side (zero-sum).
    pub fn for_player(self, player: Player) -> Self {
        if player == self.player {
            self
        } else {
            Self::new(player, -self.value)
        }
    }

    pub fn value_for(self, player: Player) -> f32 {
        self.for_player(player).value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_flips_seat() {
        assert_eq!(Player::First.other(), Player::Second);
        assert_eq!(Player::Second.other().other(), Player::Second);
    }

    #[test]
    fn win_is_plus_one_for_winner_and_minus_one_for_loser() {
        let o = Outcome::Win(Player::Second);
        assert_eq!(o.value_for(Player::Second).value, 1.0);
        assert_eq!(o.value_for(Player::First).value, -1.0);
        assert_eq!(o.winner(), Some(Player::Second));
    }

    #[test]
    fn draw_is_zero_for_both() {
        assert_eq!(Outcome::Draw.value_for(Player::First).value, 0.0);
        assert_eq!(Outcome::Draw.value_for(Player::Second).value, 0.0);
    }

    #[test]
    fn for_player_round_trips() {
        let v = PlayerValue::new(Player::First, 0.25);
        let w = v.for_player(Player::Second);
        assert_eq!(w.player, Player::Second);
        assert_eq!(w.value, -0.25);
        assert_eq!(w.for_player(Player::First), v);
    }
}
