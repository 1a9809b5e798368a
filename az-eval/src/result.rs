//! Arena tallies and the accept rule.

use az_core::DrawPolicy;
use serde::{Deserialize, Serialize};

/// Result of one arena game, from the candidate's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    CandidateWin,
    IncumbentWin,
    Draw,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaResult {
    pub games: u32,
    pub candidate_wins: u32,
    pub incumbent_wins: u32,
    pub draws: u32,
}

impl ArenaResult {
    pub fn new(candidate_wins: u32, incumbent_wins: u32, draws: u32) -> Self {
        Self {
            games: candidate_wins + incumbent_wins + draws,
            candidate_wins,
            incumbent_wins,
            draws,
        }
    }

    pub fn record(&mut self, r: GameResult) {
        self.games += 1;
        match r {
            GameResult::CandidateWin => self.candidate_wins += 1,
            GameResult::IncumbentWin => self.incumbent_wins += 1,
            GameResult::Draw => self.draws += 1,
        }
    }

    pub fn merge(&mut self, other: &ArenaResult) {
        self.games = self.games.saturating_add(other.games);
        self.candidate_wins = self.candidate_wins.saturating_add(other.candidate_wins);
        self.incumbent_wins = self.incumbent_wins.saturating_add(other.incumbent_wins);
        self.draws = self.draws.saturating_add(other.draws);
    }

    /// Candidate win ratio under `policy`; `None` when the denominator is zero.
    pub fn win_ratio(&self, policy: DrawPolicy) -> Option<f64> {
        match policy {
            DrawPolicy::Exclude => {
                let decisive = self.candidate_wins + self.incumbent_wins;
                (decisive > 0).then(|| self.candidate_wins as f64 / decisive as f64)
            }
            DrawPolicy::Half => (self.games > 0).then(|| {
                let w = self.candidate_wins as f64;
                let d = self.draws as f64;
                (w + 0.5 * d) / (self.games as f64)
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Reject,
}

impl Verdict {
    pub fn is_accept(self) -> bool {
        self == Verdict::Accept
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::Reject => "reject",
        }
    }
}

/// Accept iff the win ratio is at least `threshold`. No evidence (zero denominator) rejects.
pub fn decide(result: &ArenaResult, threshold: f64, policy: DrawPolicy) -> Verdict {
    match result.win_ratio(policy) {
        Some(r) if r >= threshold => Verdict::Accept,
        _ => Verdict::Reject,
    }
}
