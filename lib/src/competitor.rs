//! Per-side leg state: the throws one competitor has made in a leg and the
//! totals derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest score a single three-dart visit can produce.
pub const MAX_THROW_SCORE: u32 = 180;

/// Most darts a single visit can consume.
pub const MAX_DARTS_PER_THROW: u32 = 3;

/// One of the two sides in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    /// Both sides, home first.
    pub const BOTH: [Side; 2] = [Side::Home, Side::Away];

    pub fn other(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => write!(f, "home"),
            Side::Away => write!(f, "away"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "home" => Ok(Side::Home),
            "away" => Ok(Side::Away),
            _ => Err(format!("invalid side {s:?}: expected home or away")),
        }
    }
}

/// A single visit to the oche.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegThrow {
    pub score: u32,
    pub number_of_darts: u32,
    #[serde(default)]
    pub bust: bool,
}

impl LegThrow {
    pub fn new(score: u32) -> Self {
        Self {
            score,
            number_of_darts: MAX_DARTS_PER_THROW,
            bust: false,
        }
    }

    pub fn bust(score: u32) -> Self {
        Self {
            score,
            number_of_darts: MAX_DARTS_PER_THROW,
            bust: true,
        }
    }

    /// Points this throw contributes to the running total. Busts count nothing.
    pub fn counted_score(&self) -> u32 {
        if self.bust { 0 } else { self.score }
    }
}

/// Running state for one side within one leg.
///
/// `score`, `number_of_darts` and `bust` are always derived from `throws` by
/// [`LegCompetitor::recompute`]; nothing updates them incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegCompetitor {
    #[serde(default)]
    pub throws: Vec<LegThrow>,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub number_of_darts: u32,
    #[serde(default)]
    pub bust: bool,
}

impl LegCompetitor {
    /// Rebuild the derived totals from the throw sequence.
    pub fn recompute(&mut self) {
        self.score = self.throws.iter().map(LegThrow::counted_score).sum();
        self.number_of_darts = self.throws.iter().map(|t| t.number_of_darts).sum();
        self.bust = self.throws.last().is_some_and(|t| t.bust);
    }

    pub fn push(&mut self, throw: LegThrow) {
        self.throws.push(throw);
        self.recompute();
    }

    /// Remove the most recent throw, returning it.
    pub fn pop(&mut self) -> Option<LegThrow> {
        let removed = self.throws.pop();
        self.recompute();
        removed
    }

    /// Score still required to finish from `starting_score`.
    pub fn remaining(&self, starting_score: u32) -> i64 {
        i64::from(starting_score) - i64::from(self.score)
    }

    pub fn has_checked_out(&self, starting_score: u32) -> bool {
        starting_score > 0 && self.score == starting_score
    }
}
