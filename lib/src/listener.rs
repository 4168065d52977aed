//! Observer hooks for scoring sessions.
//!
//! All methods default to no-ops so implementors pick what they need.
//! Listeners are invoked after a transition has completed, never during one.

use std::sync::Arc;

use crate::ScoreAsYouGo;

pub trait SaygListener: Send + Sync {
    /// A side scored a maximum.
    fn on_180(&self, _side_name: &str) {}

    /// A side checked out on 100 or more.
    fn on_hi_check(&self, _side_name: &str, _score: u32) {}

    /// The match leg score changed.
    fn on_score_change(&self, _home: u32, _away: u32) {}

    /// A match could not be loaded.
    fn on_load_error(&self, _message: &str) {}

    /// A save succeeded.
    fn on_saved(&self, _sayg: &ScoreAsYouGo) {}

    /// The local copy was replaced by a live update from another observer.
    fn on_live_update(&self, _sayg: &ScoreAsYouGo) {}
}

/// Fan-out to every registered listener.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Vec<Arc<dyn SaygListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn SaygListener>) {
        self.inner.push(listener);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn on_180(&self, side_name: &str) {
        self.inner.iter().for_each(|l| l.on_180(side_name));
    }

    pub fn on_hi_check(&self, side_name: &str, score: u32) {
        self.inner.iter().for_each(|l| l.on_hi_check(side_name, score));
    }

    pub fn on_score_change(&self, home: u32, away: u32) {
        self.inner.iter().for_each(|l| l.on_score_change(home, away));
    }

    pub fn on_load_error(&self, message: &str) {
        self.inner.iter().for_each(|l| l.on_load_error(message));
    }

    pub fn on_saved(&self, sayg: &ScoreAsYouGo) {
        self.inner.iter().for_each(|l| l.on_saved(sayg));
    }

    pub fn on_live_update(&self, sayg: &ScoreAsYouGo) {
        self.inner.iter().for_each(|l| l.on_live_update(sayg));
    }
}
