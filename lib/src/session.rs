//! Scoring session: the single actor that mutates a match.
//!
//! Routes input to the current leg, lets the match re-evaluate itself, then
//! tells listeners what happened. Rejected input leaves the match untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    LegEvent, LegPhase, Listeners, MatchEvent, Rejected, SaygListener, ScoreAsYouGo, Side,
    ThrowEdit,
};

/// What the persistence policy should make of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistHint {
    None,
    /// The first visit of a leg was recorded.
    FirstThrow,
    /// A leg was won.
    LegComplete,
}

/// The result of an accepted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub leg_index: u32,
    pub leg_events: Vec<LegEvent>,
    pub match_events: Vec<MatchEvent>,
    pub persist: PersistHint,
}

pub struct SaygSession {
    sayg: ScoreAsYouGo,
    listeners: Listeners,
}

impl SaygSession {
    pub fn new(sayg: ScoreAsYouGo) -> Self {
        Self::with_listeners(sayg, Listeners::new())
    }

    pub fn with_listeners(mut sayg: ScoreAsYouGo, listeners: Listeners) -> Self {
        sayg.ensure_current_leg();
        Self { sayg, listeners }
    }

    pub fn sayg(&self) -> &ScoreAsYouGo {
        &self.sayg
    }

    pub fn into_sayg(self) -> ScoreAsYouGo {
        self.sayg
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SaygListener>) {
        self.listeners.add(listener);
    }

    /// Swap in a whole new snapshot. No merge.
    pub fn replace(&mut self, sayg: ScoreAsYouGo) {
        self.sayg = sayg;
    }

    /// Record the identity handed back by storage.
    pub fn set_persisted(&mut self, id: Option<Uuid>, last_updated: Option<DateTime<Utc>>) {
        if id.is_some() {
            self.sayg.id = id;
        }
        self.sayg.last_updated = last_updated;
    }

    /// Phase of the leg input applies to.
    pub fn current_phase(&self) -> Option<LegPhase> {
        self.sayg.active_leg().map(|leg| leg.phase())
    }

    fn active_leg_index(&mut self) -> Result<u32, Rejected> {
        if self.sayg.is_finished() {
            return Err(Rejected::MatchFinished);
        }
        self.sayg.ensure_current_leg();
        let index = self.sayg.active_leg_index();
        if self.sayg.legs.contains_key(&index) {
            Ok(index)
        } else {
            Err(Rejected::NoSuchLeg(index))
        }
    }

    /// Checkout input goes to whichever leg is standing on zero, which can
    /// be an earlier leg reopened by a correction.
    fn checkout_leg_index(&mut self) -> Result<u32, Rejected> {
        match self.sayg.pending_checkout_leg() {
            Some(index) => Ok(index),
            None => self.active_leg_index(),
        }
    }

    fn leg_mut(&mut self, index: u32) -> Result<&mut crate::Leg, Rejected> {
        self.sayg
            .legs
            .get_mut(&index)
            .ok_or(Rejected::NoSuchLeg(index))
    }

    pub fn choose_player_sequence(&mut self, first: Side) -> Result<Change, Rejected> {
        let index = self.active_leg_index()?;
        let home = self.sayg.side_name(Side::Home).to_string();
        let away = self.sayg.side_name(Side::Away).to_string();
        self.leg_mut(index)?
            .choose_player_sequence(first, &home, &away)?;
        Ok(self.finish(index, Vec::new(), PersistHint::None))
    }

    pub fn record_throw(&mut self, score: u32) -> Result<Change, Rejected> {
        let index = self.active_leg_index()?;
        let single_player = self.sayg.is_single_player();
        let leg = self.leg_mut(index)?;
        let first = leg.throw_count() == 0;
        let events = leg.record_throw(score, single_player)?;
        let hint = if first {
            PersistHint::FirstThrow
        } else {
            PersistHint::None
        };
        Ok(self.finish(index, events, hint))
    }

    /// Free-text score entry. Anything that is not a whole number in range
    /// is rejected.
    pub fn record_throw_text(&mut self, text: &str) -> Result<Change, Rejected> {
        let score = text
            .trim()
            .parse::<u32>()
            .map_err(|_| Rejected::NotANumber)?;
        self.record_throw(score)
    }

    pub fn confirm_checkout(&mut self, number_of_darts: u32) -> Result<Change, Rejected> {
        let index = self.checkout_leg_index()?;
        let events = self.leg_mut(index)?.confirm_checkout(number_of_darts)?;
        Ok(self.finish(index, events, PersistHint::None))
    }

    pub fn cancel_checkout(&mut self) -> Result<Change, Rejected> {
        let index = self.checkout_leg_index()?;
        let events = self.leg_mut(index)?.cancel_checkout()?;
        Ok(self.finish(index, events, PersistHint::None))
    }

    /// Correct a throw in any leg, finished or not.
    pub fn edit_throw(
        &mut self,
        leg_index: u32,
        side: Side,
        throw_index: usize,
        edit: ThrowEdit,
    ) -> Result<Change, Rejected> {
        let events = self.leg_mut(leg_index)?.edit_throw(side, throw_index, edit)?;
        Ok(self.finish(leg_index, events, PersistHint::None))
    }

    fn finish(&mut self, leg_index: u32, leg_events: Vec<LegEvent>, hint: PersistHint) -> Change {
        let match_events = self.sayg.evaluate();
        let persist = if leg_events.iter().any(|e| matches!(e, LegEvent::Won(_))) {
            PersistHint::LegComplete
        } else {
            hint
        };

        for event in &leg_events {
            match event {
                LegEvent::OneHundredEighty(side) => {
                    self.listeners.on_180(self.sayg.side_name(*side));
                }
                LegEvent::HiCheck { side, score } => {
                    self.listeners
                        .on_hi_check(self.sayg.side_name(*side), *score);
                }
                _ => {}
            }
        }
        for event in &match_events {
            if let MatchEvent::ScoreChanged { home, away } = event {
                self.listeners.on_score_change(*home, *away);
            }
        }

        Change {
            leg_index,
            leg_events,
            match_events,
            persist,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl SaygListener for Recorder {
        fn on_180(&self, side_name: &str) {
            self.calls.lock().unwrap().push(format!("180:{side_name}"));
        }

        fn on_hi_check(&self, side_name: &str, score: u32) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("hi-check:{side_name}:{score}"));
        }

        fn on_score_change(&self, home: u32, away: u32) {
            self.calls.lock().unwrap().push(format!("score:{home}-{away}"));
        }
    }

    fn session_with_recorder(sayg: ScoreAsYouGo) -> (SaygSession, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let mut session = SaygSession::new(sayg);
        session.add_listener(recorder.clone());
        (session, recorder)
    }

    #[test]
    fn five_visit_leg_to_a_two_dart_finish() {
        let (mut session, recorder) = session_with_recorder(ScoreAsYouGo::new("Solo", None, 1, 501));
        for score in [100, 100, 100, 100] {
            session.record_throw(score).unwrap();
        }
        let change = session.record_throw(101).unwrap();
        assert_eq!(change.leg_events, vec![LegEvent::CheckoutPending(Side::Home)]);
        assert_eq!(
            session.current_phase(),
            Some(LegPhase::AwaitingCheckoutConfirmation(Side::Home))
        );

        let change = session.confirm_checkout(2).unwrap();
        assert_eq!(change.persist, PersistHint::LegComplete);
        let sayg = session.sayg();
        let leg = &sayg.legs[&0];
        assert_eq!(leg.winner, Some(Side::Home));
        assert_eq!(leg.home.as_ref().unwrap().throws[4].number_of_darts, 2);
        assert_eq!(sayg.home_score, 1);
        assert!(sayg.is_finished());
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["hi-check:Solo:101", "score:1-0"]
        );
    }

    #[test]
    fn maximum_notifies_with_side_name() {
        let (mut session, recorder) =
            session_with_recorder(ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501));
        session.choose_player_sequence(Side::Away).unwrap();
        session.record_throw(180).unwrap();
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["180:Bob"]);
    }

    #[test]
    fn first_visit_of_a_leg_asks_for_a_save() {
        let mut session = SaygSession::new(ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501));
        session.choose_player_sequence(Side::Home).unwrap();
        assert_eq!(session.record_throw(60).unwrap().persist, PersistHint::FirstThrow);
        assert_eq!(session.record_throw(60).unwrap().persist, PersistHint::None);
    }

    #[test]
    fn free_text_outside_the_gate_is_rejected() {
        let mut session = SaygSession::new(ScoreAsYouGo::new("Solo", None, 1, 501));
        let before = session.sayg().clone();
        assert_matches!(session.record_throw_text("abc"), Err(Rejected::NotANumber));
        assert_matches!(session.record_throw_text("-5"), Err(Rejected::NotANumber));
        assert_matches!(
            session.record_throw_text("181"),
            Err(Rejected::ScoreOutOfRange(181))
        );
        assert_eq!(session.sayg(), &before);
        assert!(session.record_throw_text(" 60 ").is_ok());
    }

    #[test]
    fn finished_match_refuses_more_throws() {
        let mut session = SaygSession::new(ScoreAsYouGo::new("Solo", None, 1, 101));
        session.record_throw(101).unwrap();
        session.confirm_checkout(3).unwrap();
        assert_matches!(session.record_throw(20), Err(Rejected::MatchFinished));
    }

    #[test]
    fn revoking_a_win_reopens_the_leg() {
        let mut session = SaygSession::new(ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 101));
        session.choose_player_sequence(Side::Home).unwrap();
        session.record_throw(101).unwrap();
        session.confirm_checkout(3).unwrap();
        assert_eq!(session.sayg().home_score, 1);
        assert_eq!(session.sayg().current_leg_index(), 1);

        let edit = ThrowEdit {
            score: Some(100),
            ..Default::default()
        };
        let change = session.edit_throw(0, Side::Home, 0, edit).unwrap();
        assert_eq!(
            change.match_events,
            vec![MatchEvent::ScoreChanged { home: 0, away: 0 }]
        );
        assert_eq!(session.sayg().current_leg_index(), 0);
        assert_eq!(
            session.current_phase(),
            Some(LegPhase::InProgress(Side::Home))
        );
    }

    #[test]
    fn corrected_checkout_in_an_earlier_leg_can_still_be_confirmed() {
        let (mut session, recorder) =
            session_with_recorder(ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 101));
        session.choose_player_sequence(Side::Home).unwrap();
        session.record_throw(101).unwrap();
        session.confirm_checkout(3).unwrap();
        // Leg 1: Bob throws first and wins.
        session.record_throw(101).unwrap();
        session.confirm_checkout(2).unwrap();
        assert_eq!((session.sayg().home_score, session.sayg().away_score), (1, 1));

        let set = |score| ThrowEdit {
            score: Some(score),
            ..Default::default()
        };
        session.edit_throw(0, Side::Home, 0, set(100)).unwrap();
        assert_eq!((session.sayg().home_score, session.sayg().away_score), (0, 1));
        let change = session.edit_throw(0, Side::Home, 0, set(101)).unwrap();
        assert!(change.leg_events.contains(&LegEvent::CheckoutPending(Side::Home)));
        assert_eq!(
            session.current_phase(),
            Some(LegPhase::AwaitingCheckoutConfirmation(Side::Home))
        );
        assert_matches!(session.record_throw(60), Err(Rejected::WrongPhase(_)));

        let change = session.confirm_checkout(1).unwrap();
        assert_eq!(change.leg_index, 0);
        let sayg = session.sayg();
        assert_eq!(sayg.legs[&0].winner, Some(Side::Home));
        assert_eq!(sayg.legs[&0].home.as_ref().unwrap().throws[0].number_of_darts, 1);
        assert_eq!((sayg.home_score, sayg.away_score), (1, 1));
        assert_eq!(sayg.current_leg_index(), 2);
        assert_eq!(session.current_phase(), Some(LegPhase::AwaitingFirstThrower));
        // The corrected checkout was already reported when first played.
        let hi_checks = recorder
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("hi-check"))
            .count();
        assert_eq!(hi_checks, 2);
    }

    #[test]
    fn corrected_checkout_in_an_earlier_leg_can_be_cancelled() {
        let mut session = SaygSession::new(ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 101));
        session.choose_player_sequence(Side::Home).unwrap();
        session.record_throw(101).unwrap();
        session.confirm_checkout(3).unwrap();
        session.record_throw(101).unwrap();
        session.confirm_checkout(2).unwrap();

        let set = |score| ThrowEdit {
            score: Some(score),
            ..Default::default()
        };
        session.edit_throw(0, Side::Home, 0, set(100)).unwrap();
        session.edit_throw(0, Side::Home, 0, set(101)).unwrap();

        let change = session.cancel_checkout().unwrap();
        assert_eq!(change.leg_index, 0);
        assert!(session.sayg().legs[&0].home.as_ref().unwrap().throws.is_empty());
        assert_eq!(session.current_phase(), Some(LegPhase::InProgress(Side::Home)));
        session.record_throw(60).unwrap();
        assert_eq!(session.sayg().legs[&0].home.as_ref().unwrap().score, 60);
    }
}
