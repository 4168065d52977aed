//! Live sync bridge. Keeps a scoring session in step with durable storage
//! and the live channel.
//!
//! Local input always lands in the session first; saving and publishing
//! happen afterwards and never roll scoring back. Incoming live updates
//! replace the session's match wholesale (last applied wins).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::{
    Change, LiveDataType, LiveHandler, LiveMessage, LiveTransport, PersistHint, Rejected,
    SaygError, SaygSession, SaygStorage, ScoreAsYouGo, Side, Subscription, ThrowEdit,
};

/// Message reported through `on_load_error` when a match cannot be used.
pub const LOAD_ERROR: &str = "Data not found";

/// Who persists the match when a leg is won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegSave {
    /// The bridge saves.
    #[default]
    Bridge,
    /// The caller has its own trigger; the bridge leaves it alone.
    Caller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Save as soon as the first visit of a leg is recorded.
    pub auto_save: bool,
    pub leg_save: LegSave,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            auto_save: true,
            leg_save: LegSave::Bridge,
        }
    }
}

/// A refused save, kept for display until dismissed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveFailure {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
}

struct LiveLink {
    id: Uuid,
    subscription: Box<dyn Subscription>,
    active: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct LiveSyncBridge {
    session: Arc<Mutex<SaygSession>>,
    storage: Arc<dyn SaygStorage>,
    transport: Arc<dyn LiveTransport>,
    options: BridgeOptions,
    live: Option<LiveLink>,
    save_failure: Option<SaveFailure>,
    publish_warning: Option<String>,
    live_error: Arc<Mutex<Option<String>>>,
}

impl LiveSyncBridge {
    pub fn new(
        session: SaygSession,
        storage: Arc<dyn SaygStorage>,
        transport: Arc<dyn LiveTransport>,
        options: BridgeOptions,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            storage,
            transport,
            options,
            live: None,
            save_failure: None,
            publish_warning: None,
            live_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Lock the session for reading or direct manipulation.
    pub fn session(&self) -> MutexGuard<'_, SaygSession> {
        lock(&self.session)
    }

    pub fn snapshot(&self) -> ScoreAsYouGo {
        self.session().sayg().clone()
    }

    pub fn options(&self) -> BridgeOptions {
        self.options
    }

    /// Replace the session's match with the stored copy of `id`.
    ///
    /// Returns `Ok(false)` (after notifying `on_load_error`) when there is no
    /// such match or it is missing leg structure.
    pub fn load(&mut self, id: Uuid) -> Result<bool, SaygError> {
        let loaded = self.storage.get(id)?;
        let usable = loaded.filter(|sayg| sayg.validation_errors().is_empty());
        let mut session = self.session();
        match usable {
            Some(mut sayg) => {
                sayg.ensure_current_leg();
                session.replace(sayg);
                Ok(true)
            }
            None => {
                let listeners = session.listeners().clone();
                drop(session);
                tracing::warn!("sayg {id}: {LOAD_ERROR}");
                listeners.on_load_error(LOAD_ERROR);
                Ok(false)
            }
        }
    }

    /// Run one input against the session, then save and publish as the
    /// policy requires. Rejected input returns `Ok(None)` and does nothing
    /// else.
    ///
    /// A storage call that fails outright is returned as `Err` after the
    /// live snapshot has been published; the scoring change itself stands.
    pub fn apply<F>(&mut self, op: F) -> Result<Option<Change>, SaygError>
    where
        F: FnOnce(&mut SaygSession) -> Result<Change, Rejected>,
    {
        let result = op(&mut self.session());
        let change = match result {
            Ok(change) => change,
            Err(rejected) => {
                tracing::debug!("input ignored: {rejected}");
                return Ok(None);
            }
        };

        let should_save = match change.persist {
            PersistHint::FirstThrow => self.options.auto_save,
            PersistHint::LegComplete => self.options.leg_save == LegSave::Bridge,
            PersistHint::None => false,
        };
        let saved = if should_save {
            self.save().map(|_| ())
        } else {
            Ok(())
        };
        if self.live.is_some() {
            self.publish();
        }
        saved?;
        Ok(Some(change))
    }

    pub fn choose_player_sequence(&mut self, first: Side) -> Result<Option<Change>, SaygError> {
        self.apply(|s| s.choose_player_sequence(first))
    }

    pub fn record_throw(&mut self, score: u32) -> Result<Option<Change>, SaygError> {
        self.apply(|s| s.record_throw(score))
    }

    pub fn record_throw_text(&mut self, text: &str) -> Result<Option<Change>, SaygError> {
        self.apply(|s| s.record_throw_text(text))
    }

    pub fn confirm_checkout(&mut self, number_of_darts: u32) -> Result<Option<Change>, SaygError> {
        self.apply(|s| s.confirm_checkout(number_of_darts))
    }

    pub fn cancel_checkout(&mut self) -> Result<Option<Change>, SaygError> {
        self.apply(|s| s.cancel_checkout())
    }

    pub fn edit_throw(
        &mut self,
        leg_index: u32,
        side: Side,
        throw_index: usize,
        edit: ThrowEdit,
    ) -> Result<Option<Change>, SaygError> {
        self.apply(|s| s.edit_throw(leg_index, side, throw_index, edit))
    }

    /// Persist the current match and adopt the id storage hands back.
    ///
    /// A refusal is kept in [`LiveSyncBridge::save_failure`] and returns
    /// `Ok(None)`; the session is left exactly as it was.
    pub fn save(&mut self) -> Result<Option<Uuid>, SaygError> {
        let snapshot = self.snapshot();
        let response = self.storage.upsert(&snapshot)?;
        if !response.success {
            tracing::warn!("save refused: {}", response.errors.join("; "));
            self.save_failure = Some(SaveFailure {
                errors: response.errors,
                warnings: response.warnings,
                messages: response.messages,
            });
            return Ok(None);
        }
        self.save_failure = None;

        let (id, last_updated) = match response.result {
            Some(stored) => (stored.id.or(snapshot.id), stored.last_updated),
            None => (snapshot.id, snapshot.last_updated),
        };
        let (saved, listeners) = {
            let mut session = self.session();
            session.set_persisted(id, last_updated);
            (session.sayg().clone(), session.listeners().clone())
        };
        tracing::debug!("saved sayg {:?}", saved.id);
        listeners.on_saved(&saved);
        Ok(saved.id)
    }

    /// Send the current snapshot to live observers. Failures become a
    /// warning for the publisher; local play carries on.
    pub fn publish(&mut self) -> bool {
        let snapshot = self.snapshot();
        let Some(id) = snapshot.id else {
            self.publish_warning = Some("cannot publish a match that has not been saved".into());
            return false;
        };
        match self.transport.publish(id, LiveDataType::Sayg, &snapshot) {
            Ok(true) => {
                self.publish_warning = None;
                true
            }
            Ok(false) => {
                tracing::warn!("live update for {id} was rejected");
                self.publish_warning = Some("Unable to publish live update".into());
                false
            }
            Err(e) => {
                tracing::warn!("live update for {id} failed: {e}");
                self.publish_warning = Some(format!("Unable to publish live update: {e}"));
                false
            }
        }
    }

    /// Turn live updates on or off for match `id`.
    pub fn enable_live_updates(&mut self, enabled: bool, id: Uuid) -> Result<(), SaygError> {
        if !enabled {
            self.disable_live_updates();
            return Ok(());
        }
        if self.live.as_ref().is_some_and(|link| link.id == id) {
            return Ok(());
        }
        self.disable_live_updates();

        let active = Arc::new(AtomicBool::new(true));
        let handler = self.live_handler(id, Arc::clone(&active));
        let subscription = self
            .transport
            .subscribe(id, LiveDataType::Sayg, handler)?;
        tracing::info!("live updates enabled for {id}");
        self.live = Some(LiveLink {
            id,
            subscription,
            active,
        });
        Ok(())
    }

    /// Tear down the live subscription. No snapshot replacement happens once
    /// this returns.
    pub fn disable_live_updates(&mut self) {
        let Some(mut link) = self.live.take() else {
            return;
        };
        {
            // Flip under the session lock so an in-flight update either
            // finished already or will see the flag.
            let _session = self.session();
            link.active.store(false, Ordering::SeqCst);
        }
        link.subscription.unsubscribe();
        tracing::info!("live updates disabled for {}", link.id);
    }

    fn live_handler(&self, id: Uuid, active: Arc<AtomicBool>) -> LiveHandler {
        let session = Arc::clone(&self.session);
        let live_error = Arc::clone(&self.live_error);
        Box::new(move |message| match message {
            LiveMessage::Update {
                id: update_id,
                data,
            } => {
                if update_id != id {
                    return;
                }
                let (snapshot, listeners) = {
                    let mut session = lock(&session);
                    if !active.load(Ordering::SeqCst) {
                        return;
                    }
                    session.replace(*data);
                    (session.sayg().clone(), session.listeners().clone())
                };
                listeners.on_live_update(&snapshot);
            }
            LiveMessage::Error { message } => {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                tracing::warn!("live channel error for {id}: {message}");
                *lock(&live_error) = Some(message);
            }
        })
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn save_failure(&self) -> Option<&SaveFailure> {
        self.save_failure.as_ref()
    }

    pub fn dismiss_save_failure(&mut self) {
        self.save_failure = None;
    }

    pub fn publish_warning(&self) -> Option<&str> {
        self.publish_warning.as_deref()
    }

    pub fn dismiss_publish_warning(&mut self) {
        self.publish_warning = None;
    }

    /// The most recent error reported by the live channel, cleared on read.
    pub fn take_live_error(&self) -> Option<String> {
        lock(&self.live_error).take()
    }
}

impl Drop for LiveSyncBridge {
    fn drop(&mut self) {
        self.disable_live_updates();
    }
}

// ---------------------------------------------------------------------------
// Batch save
// ---------------------------------------------------------------------------

/// Stops a running [`BatchSave`] before its next storage call.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchProgress {
    Complete,
    /// Stopped before saving item `next`.
    Aborted { next: usize },
    /// Storage refused item `index`.
    Failed { index: usize, errors: Vec<String> },
}

/// Saves several matches in order, one storage call at a time.
pub struct BatchSave {
    items: Vec<ScoreAsYouGo>,
    next: usize,
    abort: AbortHandle,
}

impl BatchSave {
    pub fn new(items: Vec<ScoreAsYouGo>) -> Self {
        Self {
            items,
            next: 0,
            abort: AbortHandle::default(),
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Items saved so far, as returned by storage.
    pub fn saved(&self) -> &[ScoreAsYouGo] {
        &self.items[..self.next]
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.next
    }

    /// Save from the first unsaved item until done, refused, or aborted. An
    /// abort never interrupts the call already in flight.
    pub fn run(&mut self, storage: &dyn SaygStorage) -> Result<BatchProgress, SaygError> {
        while self.next < self.items.len() {
            if self.abort.is_aborted() {
                tracing::info!("batch save aborted at item {}", self.next);
                return Ok(BatchProgress::Aborted { next: self.next });
            }
            let response = storage.upsert(&self.items[self.next])?;
            if !response.success {
                return Ok(BatchProgress::Failed {
                    index: self.next,
                    errors: response.errors,
                });
            }
            if let Some(stored) = response.result {
                self.items[self.next] = stored;
            }
            self.next += 1;
        }
        Ok(BatchProgress::Complete)
    }

    /// Clear a previous abort and carry on from the first unsaved item.
    pub fn resume(&mut self, storage: &dyn SaygStorage) -> Result<BatchProgress, SaygError> {
        self.abort.reset();
        self.run(storage)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::{SaygListener, UpsertResult};

    #[derive(Default)]
    struct MemoryStorage {
        docs: Mutex<HashMap<Uuid, ScoreAsYouGo>>,
        refuse: AtomicBool,
        explode: AtomicBool,
        upserts: AtomicUsize,
        abort_after_first: Mutex<Option<AbortHandle>>,
    }

    impl SaygStorage for MemoryStorage {
        fn get(&self, id: Uuid) -> Result<Option<ScoreAsYouGo>, SaygError> {
            Ok(lock(&self.docs).get(&id).cloned())
        }

        fn upsert(&self, data: &ScoreAsYouGo) -> Result<UpsertResult, SaygError> {
            if self.explode.load(Ordering::SeqCst) {
                return Err(SaygError::Storage("connection reset".into()));
            }
            let count = self.upserts.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                if let Some(handle) = lock(&self.abort_after_first).as_ref() {
                    handle.abort();
                }
            }
            if self.refuse.load(Ordering::SeqCst) {
                let mut failed = UpsertResult::failed(vec!["first".into(), "second".into()]);
                failed.warnings.push("careful".into());
                return Ok(failed);
            }
            let mut stored = data.clone();
            stored.id = Some(stored.id.unwrap_or_else(Uuid::new_v4));
            stored.last_updated = Some(Utc::now());
            lock(&self.docs).insert(stored.id.unwrap(), stored.clone());
            Ok(UpsertResult::ok(stored))
        }

        fn delete(&self, id: Uuid) -> Result<crate::DeleteResult, SaygError> {
            lock(&self.docs).remove(&id);
            Ok(crate::DeleteResult::ok(()))
        }
    }

    struct TestSubscription(Arc<AtomicBool>);

    impl Subscription for TestSubscription {
        fn unsubscribe(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct TestTransport {
        handlers: Mutex<Vec<(Uuid, Arc<LiveHandler>, Arc<AtomicBool>)>>,
        published: Mutex<Vec<ScoreAsYouGo>>,
        refuse: AtomicBool,
    }

    impl TestTransport {
        fn deliver(&self, message: LiveMessage) {
            let handlers: Vec<_> = lock(&self.handlers)
                .iter()
                .filter(|(_, _, closed)| !closed.load(Ordering::SeqCst))
                .map(|(_, h, _)| Arc::clone(h))
                .collect();
            for handler in handlers {
                handler(message.clone());
            }
        }

        /// Call every handler ever registered, closed or not.
        fn deliver_to_all(&self, message: LiveMessage) {
            let handlers: Vec<_> = lock(&self.handlers)
                .iter()
                .map(|(_, h, _)| Arc::clone(h))
                .collect();
            for handler in handlers {
                handler(message.clone());
            }
        }
    }

    impl LiveTransport for TestTransport {
        fn subscribe(
            &self,
            id: Uuid,
            _data_type: LiveDataType,
            handler: LiveHandler,
        ) -> Result<Box<dyn Subscription>, SaygError> {
            let closed = Arc::new(AtomicBool::new(false));
            lock(&self.handlers).push((id, Arc::new(handler), Arc::clone(&closed)));
            Ok(Box::new(TestSubscription(closed)))
        }

        fn publish(
            &self,
            _id: Uuid,
            _data_type: LiveDataType,
            data: &ScoreAsYouGo,
        ) -> Result<bool, SaygError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Ok(false);
            }
            lock(&self.published).push(data.clone());
            Ok(true)
        }
    }

    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl SaygListener for Calls {
        fn on_load_error(&self, message: &str) {
            lock(&self.0).push(format!("load-error:{message}"));
        }

        fn on_saved(&self, _sayg: &ScoreAsYouGo) {
            lock(&self.0).push("saved".into());
        }

        fn on_live_update(&self, _sayg: &ScoreAsYouGo) {
            lock(&self.0).push("live".into());
        }
    }

    struct Fixture {
        bridge: LiveSyncBridge,
        storage: Arc<MemoryStorage>,
        transport: Arc<TestTransport>,
        calls: Arc<Calls>,
    }

    fn fixture(sayg: ScoreAsYouGo, options: BridgeOptions) -> Fixture {
        let storage = Arc::new(MemoryStorage::default());
        let transport = Arc::new(TestTransport::default());
        let calls = Arc::new(Calls::default());
        let mut session = SaygSession::new(sayg);
        session.add_listener(calls.clone());
        let bridge = LiveSyncBridge::new(session, storage.clone(), transport.clone(), options);
        Fixture {
            bridge,
            storage,
            transport,
            calls,
        }
    }

    fn solo(starting_score: u32) -> ScoreAsYouGo {
        ScoreAsYouGo::new("Solo", None, 3, starting_score)
    }

    #[test]
    fn first_throw_saves_and_adopts_the_id() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.bridge.record_throw(60).unwrap();
        let id = f.bridge.snapshot().id.expect("id assigned on first throw");
        assert!(f.bridge.snapshot().last_updated.is_some());
        assert_eq!(f.storage.upserts.load(Ordering::SeqCst), 1);

        f.bridge.record_throw(60).unwrap();
        assert_eq!(f.storage.upserts.load(Ordering::SeqCst), 1);
        assert_eq!(f.bridge.snapshot().id, Some(id));
        assert_eq!(*lock(&f.calls.0), vec!["saved"]);
    }

    #[test]
    fn without_auto_save_only_leg_completion_saves() {
        let options = BridgeOptions {
            auto_save: false,
            ..Default::default()
        };
        let mut f = fixture(solo(101), options);
        f.bridge.record_throw(101).unwrap();
        assert_eq!(f.storage.upserts.load(Ordering::SeqCst), 0);
        f.bridge.confirm_checkout(3).unwrap();
        assert_eq!(f.storage.upserts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn caller_owned_leg_save_is_left_to_the_caller() {
        let options = BridgeOptions {
            auto_save: false,
            leg_save: LegSave::Caller,
        };
        let mut f = fixture(solo(101), options);
        f.bridge.record_throw(101).unwrap();
        let change = f.bridge.confirm_checkout(3).unwrap().unwrap();
        assert_eq!(change.persist, PersistHint::LegComplete);
        assert_eq!(f.storage.upserts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejected_input_touches_nothing() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        assert_eq!(f.bridge.record_throw_text("lots").unwrap(), None);
        assert_eq!(f.storage.upserts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn refused_save_is_kept_and_scoring_survives() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.storage.refuse.store(true, Ordering::SeqCst);
        f.bridge.record_throw(60).unwrap();

        let failure = f.bridge.save_failure().unwrap();
        assert_eq!(failure.errors, vec!["first", "second"]);
        assert_eq!(failure.warnings, vec!["careful"]);
        let sayg = f.bridge.snapshot();
        assert_eq!(sayg.id, None);
        assert_eq!(sayg.legs[&0].home.as_ref().unwrap().score, 60);

        f.bridge.dismiss_save_failure();
        assert!(f.bridge.save_failure().is_none());
    }

    #[test]
    fn failing_storage_is_reported_without_losing_darts() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.storage.explode.store(true, Ordering::SeqCst);
        assert_matches!(f.bridge.record_throw(45), Err(SaygError::Storage(_)));
        assert_eq!(f.bridge.snapshot().legs[&0].home.as_ref().unwrap().score, 45);
    }

    #[test]
    fn remote_snapshot_replaces_local_throws() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.bridge.record_throw(20).unwrap();
        let id = f.bridge.snapshot().id.unwrap();
        let remote = f.bridge.snapshot();
        f.bridge.enable_live_updates(true, id).unwrap();

        f.bridge.record_throw(40).unwrap();
        f.bridge.record_throw(60).unwrap();
        f.transport.deliver(LiveMessage::Update {
            id,
            data: Box::new(remote.clone()),
        });

        assert_eq!(f.bridge.snapshot(), remote);
        assert!(lock(&f.calls.0).contains(&"live".to_string()));
    }

    #[test]
    fn updates_for_other_matches_are_ignored() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.bridge.record_throw(20).unwrap();
        let id = f.bridge.snapshot().id.unwrap();
        f.bridge.enable_live_updates(true, id).unwrap();
        let before = f.bridge.snapshot();
        f.transport.deliver(LiveMessage::Update {
            id: Uuid::new_v4(),
            data: Box::new(solo(301)),
        });
        assert_eq!(f.bridge.snapshot(), before);
    }

    #[test]
    fn nothing_is_replaced_after_live_updates_stop() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.bridge.record_throw(20).unwrap();
        let id = f.bridge.snapshot().id.unwrap();
        f.bridge.enable_live_updates(true, id).unwrap();
        f.bridge.enable_live_updates(false, id).unwrap();
        assert!(!f.bridge.is_live());

        let before = f.bridge.snapshot();
        f.transport.deliver_to_all(LiveMessage::Update {
            id,
            data: Box::new(solo(301)),
        });
        assert_eq!(f.bridge.snapshot(), before);
    }

    #[test]
    fn live_errors_surface_and_keep_the_subscription() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.bridge.record_throw(20).unwrap();
        let id = f.bridge.snapshot().id.unwrap();
        f.bridge.enable_live_updates(true, id).unwrap();
        f.transport.deliver(LiveMessage::Error {
            message: "bad frame".into(),
        });
        assert_eq!(f.bridge.take_live_error().as_deref(), Some("bad frame"));
        assert_eq!(f.bridge.take_live_error(), None);
        assert!(f.bridge.is_live());
    }

    #[test]
    fn publishing_follows_each_change_while_live() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        f.bridge.record_throw(20).unwrap();
        let id = f.bridge.snapshot().id.unwrap();
        f.bridge.enable_live_updates(true, id).unwrap();
        f.bridge.record_throw(40).unwrap();
        assert_eq!(lock(&f.transport.published).len(), 1);

        f.transport.refuse.store(true, Ordering::SeqCst);
        f.bridge.record_throw(60).unwrap();
        assert!(f.bridge.publish_warning().is_some());
        assert_eq!(f.bridge.snapshot().legs[&0].home.as_ref().unwrap().score, 120);
    }

    #[test]
    fn missing_match_reports_load_error() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        assert!(!f.bridge.load(Uuid::new_v4()).unwrap());
        assert_eq!(*lock(&f.calls.0), vec!["load-error:Data not found"]);
    }

    #[test]
    fn stored_match_loads() {
        let mut f = fixture(solo(501), BridgeOptions::default());
        let mut stored = ScoreAsYouGo::new("Alice", Some("Bob".into()), 5, 301);
        let id = Uuid::new_v4();
        stored.id = Some(id);
        lock(&f.storage.docs).insert(id, stored);
        assert!(f.bridge.load(id).unwrap());
        let sayg = f.bridge.snapshot();
        assert_eq!(sayg.your_name, "Alice");
        assert!(sayg.current_leg().is_some());
    }

    #[test]
    fn batch_save_stops_on_abort_and_resumes_where_it_left_off() {
        let storage = MemoryStorage::default();
        let mut batch = BatchSave::new(vec![solo(501), solo(401), solo(301)]);
        *lock(&storage.abort_after_first) = Some(batch.abort_handle());

        let progress = batch.run(&storage).unwrap();
        assert_eq!(progress, BatchProgress::Aborted { next: 1 });
        assert_eq!(batch.saved().len(), 1);
        assert!(batch.saved()[0].id.is_some());
        assert_eq!(storage.upserts.load(Ordering::SeqCst), 1);

        assert_eq!(batch.resume(&storage).unwrap(), BatchProgress::Complete);
        assert_eq!(storage.upserts.load(Ordering::SeqCst), 3);
        assert_eq!(batch.remaining(), 0);
        assert_eq!(lock(&storage.docs).len(), 3);
    }

    #[test]
    fn batch_save_stops_at_a_refusal() {
        let storage = MemoryStorage::default();
        storage.refuse.store(true, Ordering::SeqCst);
        let mut batch = BatchSave::new(vec![solo(501), solo(401)]);
        assert_matches!(
            batch.run(&storage).unwrap(),
            BatchProgress::Failed { index: 0, .. }
        );
        assert_eq!(batch.remaining(), 2);
    }
}
