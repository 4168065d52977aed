//! Match-level state: the ordered legs of a match and the rules that decide
//! when the next leg starts and when the match is over.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Leg, PlayerSequenceEntry, Side};

pub const DEFAULT_STARTING_SCORE: u32 = 501;

/// Sequence text used for the absent away side in single-player matches.
pub const SINGLE_PLAYER_PLACEHOLDER: &str = "unused-single-player";

fn default_starting_score() -> u32 {
    DEFAULT_STARTING_SCORE
}

/// A match being scored as you go. This is the document that gets stored
/// and broadcast to live observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAsYouGo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub your_name: String,
    /// `None` means single-player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_name: Option<String>,
    pub number_of_legs: u32,
    #[serde(default)]
    pub home_score: u32,
    #[serde(default)]
    pub away_score: u32,
    /// Keyed by 0-based leg index.
    #[serde(default)]
    pub legs: BTreeMap<u32, Leg>,
    #[serde(default = "default_starting_score")]
    pub starting_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Match-level consequences of a leg transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    ScoreChanged { home: u32, away: u32 },
    LegStarted(u32),
    Finished(Option<Side>),
}

impl ScoreAsYouGo {
    pub fn new(
        your_name: impl Into<String>,
        opponent_name: Option<String>,
        number_of_legs: u32,
        starting_score: u32,
    ) -> Self {
        Self {
            id: None,
            your_name: your_name.into(),
            opponent_name,
            number_of_legs,
            home_score: 0,
            away_score: 0,
            legs: BTreeMap::new(),
            starting_score,
            last_updated: None,
        }
    }

    pub fn is_single_player(&self) -> bool {
        self.opponent_name.is_none()
    }

    /// Display name for a side.
    pub fn side_name(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.your_name,
            Side::Away => self
                .opponent_name
                .as_deref()
                .unwrap_or(SINGLE_PLAYER_PLACEHOLDER),
        }
    }

    /// The leg to play next is always the number of legs already won.
    pub fn leg_index_for(home_score: u32, away_score: u32) -> u32 {
        home_score.saturating_add(away_score)
    }

    pub fn current_leg_index(&self) -> u32 {
        Self::leg_index_for(self.home_score, self.away_score)
    }

    pub fn current_leg(&self) -> Option<&Leg> {
        self.legs.get(&self.current_leg_index())
    }

    pub fn current_leg_mut(&mut self) -> Option<&mut Leg> {
        let index = self.current_leg_index();
        self.legs.get_mut(&index)
    }

    /// The first leg standing on zero without a winner. A correction can
    /// leave an earlier leg here after later legs have been played.
    pub fn pending_checkout_leg(&self) -> Option<u32> {
        self.legs
            .iter()
            .find(|(_, leg)| leg.pending_checkout().is_some())
            .map(|(index, _)| *index)
    }

    /// The leg input applies to. A pending checkout comes first, then an
    /// earlier leg whose win was revoked, otherwise the current leg.
    pub fn active_leg_index(&self) -> u32 {
        let current = self.current_leg_index();
        self.pending_checkout_leg()
            .or_else(|| {
                self.legs
                    .range(..current)
                    .find(|(_, leg)| leg.winner.is_none())
                    .map(|(index, _)| *index)
            })
            .unwrap_or(current)
    }

    pub fn active_leg(&self) -> Option<&Leg> {
        self.legs.get(&self.active_leg_index())
    }

    fn wins_needed(&self) -> u32 {
        self.number_of_legs / 2 + 1
    }

    /// Whether winning leg `index` would end the match.
    pub fn is_last_leg(&self, index: u32) -> bool {
        if index.saturating_add(1) >= self.number_of_legs {
            return true;
        }
        if self.is_single_player() {
            return false;
        }
        let needed = self.wins_needed();
        self.home_score.saturating_add(1) >= needed || self.away_score.saturating_add(1) >= needed
    }

    pub fn is_finished(&self) -> bool {
        if self.number_of_legs == 0 {
            return false;
        }
        if self.is_single_player() {
            return self.home_score >= self.number_of_legs;
        }
        let needed = self.wins_needed();
        self.home_score >= needed
            || self.away_score >= needed
            || self.current_leg_index() >= self.number_of_legs
    }

    /// The side that won the match, or `None` while in play or drawn.
    pub fn winner(&self) -> Option<Side> {
        if !self.is_finished() {
            return None;
        }
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Greater => Some(Side::Home),
            std::cmp::Ordering::Less => Some(Side::Away),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Build the leg that would be played at `index` given the current score.
    ///
    /// The side that threw second in the previous leg throws first. The
    /// first leg, and a deciding leg reached on level scores, are left
    /// without a thrower so the players can settle who goes first.
    pub fn new_leg(&self, index: u32) -> Leg {
        let mut leg = Leg::new(self.starting_score);
        leg.is_last_leg = self.is_last_leg(index);

        if self.is_single_player() {
            leg.player_sequence = Some([
                PlayerSequenceEntry {
                    value: Side::Home,
                    text: self.your_name.clone(),
                },
                PlayerSequenceEntry {
                    value: Side::Away,
                    text: SINGLE_PLAYER_PLACEHOLDER.to_string(),
                },
            ]);
            leg.current_throw = Some(Side::Home);
            return leg;
        }

        let deciding_on_level_scores =
            index.saturating_add(1) == self.number_of_legs && self.home_score == self.away_score;
        if index == 0 || deciding_on_level_scores {
            return leg;
        }

        let previous = self
            .legs
            .get(&(index - 1))
            .and_then(|l| l.player_sequence.as_ref());
        if let Some([first, second]) = previous {
            leg.current_throw = Some(second.value);
            leg.player_sequence = Some([second.clone(), first.clone()]);
        }
        leg
    }

    /// Create the current leg if it does not exist yet and the match is
    /// still live. Returns the index of a newly created leg.
    pub fn ensure_current_leg(&mut self) -> Option<u32> {
        let index = self.current_leg_index();
        if self.is_finished() || index >= self.number_of_legs || self.legs.contains_key(&index) {
            return None;
        }
        let leg = self.new_leg(index);
        self.legs.insert(index, leg);
        Some(index)
    }

    fn legs_won(&self, side: Side) -> u32 {
        let won = self
            .legs
            .values()
            .filter(|leg| leg.winner == Some(side))
            .count();
        u32::try_from(won).unwrap_or(u32::MAX)
    }

    /// Rebuild the leg scores from the leg winners. Returns true when they
    /// changed.
    pub fn recount_scores(&mut self) -> bool {
        let (home, away) = (self.legs_won(Side::Home), self.legs_won(Side::Away));
        let changed = home != self.home_score || away != self.away_score;
        self.home_score = home;
        self.away_score = away;
        changed
    }

    /// Re-evaluate the match after a leg changed: recount, then start the
    /// next leg or declare the match over.
    pub fn evaluate(&mut self) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if !self.recount_scores() {
            return events;
        }
        events.push(MatchEvent::ScoreChanged {
            home: self.home_score,
            away: self.away_score,
        });
        self.refresh_last_leg_flags();
        if self.is_finished() {
            events.push(MatchEvent::Finished(self.winner()));
        } else if let Some(index) = self.ensure_current_leg() {
            events.push(MatchEvent::LegStarted(index));
        }
        events
    }

    /// Undecided legs follow the score; decided ones keep the flag they were
    /// played under.
    fn refresh_last_leg_flags(&mut self) {
        let open: Vec<u32> = self
            .legs
            .iter()
            .filter(|(_, leg)| leg.winner.is_none())
            .map(|(index, _)| *index)
            .collect();
        for index in open {
            let last = self.is_last_leg(index);
            if let Some(leg) = self.legs.get_mut(&index) {
                leg.is_last_leg = last;
            }
        }
    }

    /// Problems that make this document unusable for scoring.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.number_of_legs == 0 {
            errors.push("number of legs must be greater than zero".to_string());
        }
        if self.starting_score == 0 {
            errors.push("starting score must be greater than zero".to_string());
        }
        for (index, leg) in &self.legs {
            if !leg.is_well_formed() {
                errors.push(format!("leg {index} is missing a competitor"));
            }
        }
        let (home, away) = (self.legs_won(Side::Home), self.legs_won(Side::Away));
        if home != self.home_score || away != self.away_score {
            errors.push(format!(
                "leg score {}-{} does not match the leg winners ({home}-{away})",
                self.home_score, self.away_score
            ));
        }
        errors
    }
}
