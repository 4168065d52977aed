//! Leg state machine: throw entry, bust detection, checkout confirmation
//! and after-the-fact corrections for a single leg.
//!
//! The phase of a leg is never stored; it is read back from the data
//! (`winner`, the competitors' scores and `current_throw`) so a snapshot
//! received from another observer resumes in exactly the same phase.

use serde::{Deserialize, Serialize};

use crate::{LegCompetitor, LegThrow, MAX_DARTS_PER_THROW, MAX_THROW_SCORE, Side};

/// Checkouts at or above this score are reported as hi-checks.
pub const HI_CHECK_THRESHOLD: u32 = 100;

/// One slot of the throwing order for a leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSequenceEntry {
    pub value: Side,
    pub text: String,
}

/// Where a leg is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegPhase {
    /// Nobody has been chosen to throw first yet.
    AwaitingFirstThrower,
    /// The given side is due to throw.
    InProgress(Side),
    /// The given side has reached zero; the darts used for the final visit
    /// have not been confirmed yet.
    AwaitingCheckoutConfirmation(Side),
    /// The given side won the leg.
    Complete(Side),
}

/// Something a leg transition wants observers to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegEvent {
    Scored { side: Side, score: u32 },
    Bust(Side),
    OneHundredEighty(Side),
    CheckoutPending(Side),
    CheckoutCancelled(Side),
    HiCheck { side: Side, score: u32 },
    Won(Side),
    ThrowEdited { side: Side, index: usize },
    WinRevoked(Side),
}

/// Why an input was refused. Rejections never change state; callers at the
/// session boundary drop them silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("score {0} is outside 0..=180")]
    ScoreOutOfRange(u32),
    #[error("dart count {0} is not valid here")]
    DartsOutOfRange(u32),
    #[error("input is not a whole number")]
    NotANumber,
    #[error("not valid while the leg is {0:?}")]
    WrongPhase(LegPhase),
    #[error("{side} has no throw at index {index}")]
    NoSuchThrow { side: Side, index: usize },
    #[error("correction would take the score past the starting score")]
    ExceedsStartingScore,
    #[error("both sides cannot finish the same leg")]
    DoubleCheckout,
    #[error("leg {0} does not exist")]
    NoSuchLeg(u32),
    #[error("the match is already decided")]
    MatchFinished,
}

/// A correction to a recorded throw. `None` fields are left untouched; a
/// dart count of zero deletes the throw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowEdit {
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub number_of_darts: Option<u32>,
    #[serde(default)]
    pub bust: Option<bool>,
}

/// One leg of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub starting_score: u32,
    #[serde(default)]
    pub home: Option<LegCompetitor>,
    #[serde(default)]
    pub away: Option<LegCompetitor>,
    #[serde(default)]
    pub current_throw: Option<Side>,
    #[serde(default)]
    pub player_sequence: Option<[PlayerSequenceEntry; 2]>,
    #[serde(default)]
    pub is_last_leg: bool,
    #[serde(default)]
    pub winner: Option<Side>,
    /// Set while a pending checkout was produced by a correction rather than
    /// by live entry. Local to the scorer; not part of the snapshot.
    #[serde(skip)]
    correcting: bool,
}

impl Leg {
    pub fn new(starting_score: u32) -> Self {
        Self {
            starting_score,
            home: Some(LegCompetitor::default()),
            away: Some(LegCompetitor::default()),
            current_throw: None,
            player_sequence: None,
            is_last_leg: false,
            winner: None,
            correcting: false,
        }
    }

    pub fn competitor(&self, side: Side) -> Option<&LegCompetitor> {
        match side {
            Side::Home => self.home.as_ref(),
            Side::Away => self.away.as_ref(),
        }
    }

    /// Mutable access, creating an empty competitor if the snapshot lacked one.
    pub fn competitor_mut(&mut self, side: Side) -> &mut LegCompetitor {
        match side {
            Side::Home => self.home.get_or_insert_with(LegCompetitor::default),
            Side::Away => self.away.get_or_insert_with(LegCompetitor::default),
        }
    }

    /// Both competitors are present.
    pub fn is_well_formed(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }

    /// Total visits recorded by both sides.
    pub fn throw_count(&self) -> usize {
        Side::BOTH
            .iter()
            .filter_map(|s| self.competitor(*s))
            .map(|c| c.throws.len())
            .sum()
    }

    /// The side standing on zero without a declared winner, if any.
    pub fn pending_checkout(&self) -> Option<Side> {
        if self.winner.is_some() {
            return None;
        }
        Side::BOTH.into_iter().find(|side| {
            self.competitor(*side)
                .is_some_and(|c| c.has_checked_out(self.starting_score))
        })
    }

    pub fn phase(&self) -> LegPhase {
        if let Some(winner) = self.winner {
            return LegPhase::Complete(winner);
        }
        if let Some(side) = self.pending_checkout() {
            return LegPhase::AwaitingCheckoutConfirmation(side);
        }
        match self.current_throw {
            Some(side) => LegPhase::InProgress(side),
            None => LegPhase::AwaitingFirstThrower,
        }
    }

    /// Whether the pending checkout came from a correction.
    pub fn is_correcting(&self) -> bool {
        self.correcting
    }

    /// Fix the throwing order for this leg, `first` throwing first.
    pub fn choose_player_sequence(
        &mut self,
        first: Side,
        home_name: &str,
        away_name: &str,
    ) -> Result<(), Rejected> {
        let phase = self.phase();
        if phase != LegPhase::AwaitingFirstThrower {
            return Err(Rejected::WrongPhase(phase));
        }
        let name = |side: Side| match side {
            Side::Home => home_name.to_string(),
            Side::Away => away_name.to_string(),
        };
        self.player_sequence = Some([
            PlayerSequenceEntry {
                value: first,
                text: name(first),
            },
            PlayerSequenceEntry {
                value: first.other(),
                text: name(first.other()),
            },
        ]);
        self.current_throw = Some(first);
        Ok(())
    }

    /// Record a three-dart visit for the side currently throwing.
    ///
    /// A visit leaving exactly zero parks the leg awaiting checkout
    /// confirmation. A visit leaving less than zero, or exactly one, is a
    /// bust: the darts count but the score does not.
    pub fn record_throw(
        &mut self,
        score: u32,
        single_player: bool,
    ) -> Result<Vec<LegEvent>, Rejected> {
        let side = match self.phase() {
            LegPhase::InProgress(side) => side,
            phase => return Err(Rejected::WrongPhase(phase)),
        };
        if score > MAX_THROW_SCORE {
            return Err(Rejected::ScoreOutOfRange(score));
        }

        let starting_score = self.starting_score;
        let competitor = self.competitor_mut(side);
        let remaining = competitor.remaining(starting_score) - i64::from(score);
        let next = if single_player { side } else { side.other() };

        if remaining == 0 {
            competitor.push(LegThrow::new(score));
            self.correcting = false;
            return Ok(vec![LegEvent::CheckoutPending(side)]);
        }

        if remaining <= 1 {
            competitor.push(LegThrow::bust(score));
            self.current_throw = Some(next);
            return Ok(vec![LegEvent::Bust(side)]);
        }

        competitor.push(LegThrow::new(score));
        self.current_throw = Some(next);
        let mut events = vec![LegEvent::Scored { side, score }];
        if score == MAX_THROW_SCORE {
            events.push(LegEvent::OneHundredEighty(side));
        }
        Ok(events)
    }

    /// Confirm how many darts the finishing visit used and award the leg.
    pub fn confirm_checkout(&mut self, number_of_darts: u32) -> Result<Vec<LegEvent>, Rejected> {
        let side = match self.phase() {
            LegPhase::AwaitingCheckoutConfirmation(side) => side,
            phase => return Err(Rejected::WrongPhase(phase)),
        };
        if !(1..=MAX_DARTS_PER_THROW).contains(&number_of_darts) {
            return Err(Rejected::DartsOutOfRange(number_of_darts));
        }

        let competitor = self.competitor_mut(side);
        let Some(last) = competitor.throws.last_mut() else {
            return Err(Rejected::NoSuchThrow { side, index: 0 });
        };
        last.number_of_darts = number_of_darts;
        let checkout_score = last.score;
        competitor.recompute();

        self.winner = Some(side);
        let mut events = Vec::with_capacity(2);
        // Corrections have already been reported once.
        if !self.correcting && checkout_score >= HI_CHECK_THRESHOLD {
            events.push(LegEvent::HiCheck {
                side,
                score: checkout_score,
            });
        }
        self.correcting = false;
        events.push(LegEvent::Won(side));
        Ok(events)
    }

    /// Back out of a pending checkout: the finishing visit is discarded and
    /// the same side throws again.
    pub fn cancel_checkout(&mut self) -> Result<Vec<LegEvent>, Rejected> {
        let side = match self.phase() {
            LegPhase::AwaitingCheckoutConfirmation(side) => side,
            phase => return Err(Rejected::WrongPhase(phase)),
        };
        self.competitor_mut(side).pop();
        self.current_throw = Some(side);
        self.correcting = false;
        Ok(vec![LegEvent::CheckoutCancelled(side)])
    }

    /// Correct a recorded throw, at any point in the leg's life.
    ///
    /// Totals are rebuilt from the corrected sequence. A correction that puts
    /// the side on zero re-opens checkout confirmation; one that takes the
    /// winner off zero revokes the win.
    pub fn edit_throw(
        &mut self,
        side: Side,
        index: usize,
        edit: ThrowEdit,
    ) -> Result<Vec<LegEvent>, Rejected> {
        if let Some(score) = edit.score
            && score > MAX_THROW_SCORE
        {
            return Err(Rejected::ScoreOutOfRange(score));
        }
        if let Some(darts) = edit.number_of_darts
            && darts > MAX_DARTS_PER_THROW
        {
            return Err(Rejected::DartsOutOfRange(darts));
        }

        let starting_score = self.starting_score;
        let already_pending = self.pending_checkout().is_some();
        let Some(existing) = self.competitor(side) else {
            return Err(Rejected::NoSuchThrow { side, index });
        };
        if index >= existing.throws.len() {
            return Err(Rejected::NoSuchThrow { side, index });
        }

        let mut corrected = existing.clone();
        let target = &mut corrected.throws[index];
        if let Some(score) = edit.score {
            target.score = score;
        }
        if let Some(bust) = edit.bust {
            target.bust = bust;
        }
        if let Some(darts) = edit.number_of_darts {
            target.number_of_darts = darts;
        }
        if corrected.throws[index].number_of_darts == 0 {
            corrected.throws.remove(index);
        }
        corrected.recompute();

        if corrected.score > starting_score {
            return Err(Rejected::ExceedsStartingScore);
        }
        let now_on_zero = corrected.has_checked_out(starting_score);
        let other_on_zero = self
            .competitor(side.other())
            .is_some_and(|c| c.has_checked_out(starting_score));
        if now_on_zero && other_on_zero {
            return Err(Rejected::DoubleCheckout);
        }

        *self.competitor_mut(side) = corrected;
        let mut events = vec![LegEvent::ThrowEdited { side, index }];

        match self.winner {
            Some(winner) if winner == side && !now_on_zero => {
                self.winner = None;
                self.current_throw = Some(side);
                events.push(LegEvent::WinRevoked(side));
            }
            None if now_on_zero && !already_pending => {
                self.correcting = true;
                events.push(LegEvent::CheckoutPending(side));
            }
            _ => {}
        }
        if self.pending_checkout().is_none() {
            self.correcting = false;
        }
        Ok(events)
    }
}
