//! Bus-backed collaborators for an in-process scoring session.
//!
//! `BusStorage` turns storage calls into `StorageCommand` request-reply
//! exchanges with the `SystemActor`. `BusTransport` publishes and receives
//! `LiveUpdate` events, so a local scorer and any `/api/live` client watch
//! the same match.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use uuid::Uuid;

use crate::bus::{BusReceiver, BusSender, POLL_INTERVAL, PollError};
use crate::state::MatchStore;
use crate::state::config::generate_id;
use sayg::{
    BusEvent, BusMessage, DeleteResult, LiveDataType, LiveHandler, LiveMessage, LiveTransport,
    LiveUpdate, SaygError, SaygStorage, ScoreAsYouGo, StorageAction, StorageCommand,
    StorageReply, Subscription, UpsertResult,
};

const STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// BusStorage
// ---------------------------------------------------------------------------

/// Reads come straight from the shared store; writes go through the
/// `SystemActor`, which holds the only writer.
pub struct BusStorage {
    sender: BusSender,
    store: MatchStore,
}

impl BusStorage {
    pub fn new(sender: BusSender, store: MatchStore) -> Self {
        Self { sender, store }
    }

    fn request(&self, action: StorageAction) -> Result<StorageReply, SaygError> {
        let request_id = generate_id();
        // Subscribe first so the outcome cannot slip past.
        let mut receiver = self.sender.subscribe();
        self.sender.send(BusMessage::new(StorageCommand {
            request_id: Some(request_id.clone()),
            action,
        }));

        let reply = receiver.wait_for(STORAGE_TIMEOUT, |msg| match &msg.event {
            BusEvent::StorageOutcome(outcome) if outcome.request_id == request_id => {
                Some(outcome.reply.clone())
            }
            _ => None,
        });
        match reply {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => {
                tracing::warn!("store request {request_id}: no StorageOutcome");
                Err(SaygError::Timeout("the match store"))
            }
            Err(PollError::Shutdown) => Err(SaygError::Storage("bus shut down".into())),
        }
    }
}

impl SaygStorage for BusStorage {
    fn get(&self, id: Uuid) -> Result<Option<ScoreAsYouGo>, SaygError> {
        Ok(self.store.get(id))
    }

    fn upsert(&self, data: &ScoreAsYouGo) -> Result<UpsertResult, SaygError> {
        let action = StorageAction::Upsert {
            data: Box::new(data.clone()),
        };
        match self.request(action)? {
            StorageReply::Upserted(result) => Ok(result),
            StorageReply::Failed { error } => Err(SaygError::Storage(error)),
            other => Err(SaygError::Storage(format!("unexpected store reply: {other:?}"))),
        }
    }

    fn delete(&self, id: Uuid) -> Result<DeleteResult, SaygError> {
        match self.request(StorageAction::Delete { id })? {
            StorageReply::Deleted(result) => Ok(result),
            StorageReply::Failed { error } => Err(SaygError::Storage(error)),
            other => Err(SaygError::Storage(format!("unexpected store reply: {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// BusTransport
// ---------------------------------------------------------------------------

struct Inner {
    subscribers: Mutex<HashMap<u64, (Uuid, LiveHandler)>>,
    next_key: AtomicU64,
    stop: AtomicBool,
}

/// Live channel over the in-process bus. Updates this transport published
/// itself are not delivered back to it.
pub struct BusTransport {
    sender: BusSender,
    inner: Arc<Inner>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl BusTransport {
    pub fn new(sender: BusSender) -> std::io::Result<Self> {
        let inner = Arc::new(Inner {
            subscribers: Mutex::new(HashMap::new()),
            next_key: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        });
        let receiver = sender.subscribe();
        let own_id = sender.actor_id().to_string();
        let poll_inner = Arc::clone(&inner);
        let poller = std::thread::Builder::new()
            .name(format!("{own_id}.live"))
            .spawn(move || poll_loop(poll_inner, receiver, own_id))?;
        Ok(Self {
            sender,
            inner,
            poller: Mutex::new(Some(poller)),
        })
    }
}

fn poll_loop(inner: Arc<Inner>, mut receiver: BusReceiver, own_id: String) {
    while !inner.stop.load(Ordering::SeqCst) {
        match receiver.poll() {
            Err(PollError::Shutdown) => break,
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Ok(Some(msg)) => {
                let BusEvent::LiveUpdate(update) = msg.event else {
                    continue;
                };
                if msg.source == own_id {
                    continue;
                }
                let subscribers = lock(&inner.subscribers);
                for (id, handler) in subscribers.values() {
                    if *id == update.id {
                        handler(LiveMessage::Update {
                            id: update.id,
                            data: update.data.clone(),
                        });
                    }
                }
            }
        }
    }
    tracing::debug!("{own_id}: live poller exiting");
}

struct BusSubscription {
    inner: Arc<Inner>,
    key: u64,
}

impl Subscription for BusSubscription {
    fn unsubscribe(&mut self) {
        lock(&self.inner.subscribers).remove(&self.key);
    }
}

impl LiveTransport for BusTransport {
    fn subscribe(
        &self,
        id: Uuid,
        _data_type: LiveDataType,
        handler: LiveHandler,
    ) -> Result<Box<dyn Subscription>, SaygError> {
        let key = self.inner.next_key.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.subscribers).insert(key, (id, handler));
        Ok(Box::new(BusSubscription {
            inner: Arc::clone(&self.inner),
            key,
        }))
    }

    fn publish(
        &self,
        id: Uuid,
        data_type: LiveDataType,
        data: &ScoreAsYouGo,
    ) -> Result<bool, SaygError> {
        self.sender.send(BusMessage::new(LiveUpdate {
            id,
            data_type,
            data: Box::new(data.clone()),
        }));
        Ok(true)
    }
}

impl Drop for BusTransport {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = lock(&self.poller).take() {
            // A handler may drop the last reference from the poller itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;

    use assert_matches::assert_matches;
    use sayg::SaygConfig;
    use tokio::sync::broadcast;

    use super::*;
    use crate::actors::Actor;
    use crate::actors::system::SystemActor;
    use crate::state::SystemState;
    use crate::state::config::save_to;

    fn sender(id: &str, bus_tx: &broadcast::Sender<BusMessage>) -> BusSender {
        BusSender::new(id.into(), bus_tx.clone(), Arc::new(AtomicBool::new(false)))
    }

    /// A bus with a running `SystemActor` over a temporary store.
    fn system(dir: &tempfile::TempDir) -> (broadcast::Sender<BusMessage>, MatchStore) {
        let config_path = dir.path().join("config.toml");
        let mut config = SaygConfig::default();
        config.storage.path = Some(dir.path().join("matches"));
        save_to(&config_path, &config);

        let (root, writer) = SystemState::new(config_path).unwrap();
        let root = Arc::new(root);
        let store = root.store.clone();
        let (bus_tx, _) = broadcast::channel(64);
        let system = sender("system", &bus_tx);
        let receiver = system.subscribe();
        let (actor, ready) = SystemActor::new(writer);
        actor.start(root, system, receiver);
        ready.recv().unwrap();
        (bus_tx, store)
    }

    #[test]
    fn upsert_round_trips_through_the_system_actor() {
        let dir = tempfile::tempdir().unwrap();
        let (bus_tx, store) = system(&dir);
        let storage = BusStorage::new(sender("scorer", &bus_tx), store);

        let result = storage
            .upsert(&ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501))
            .unwrap();
        assert!(result.success);
        let id = result.result.unwrap().id.unwrap();
        assert_eq!(storage.get(id).unwrap().unwrap().your_name, "Alice");

        assert!(storage.delete(id).unwrap().success);
        assert_eq!(storage.get(id).unwrap(), None);
    }

    #[test]
    fn refused_writes_come_back_unsuccessful() {
        let dir = tempfile::tempdir().unwrap();
        let (bus_tx, store) = system(&dir);
        let storage = BusStorage::new(sender("scorer", &bus_tx), store);

        let mut invalid = ScoreAsYouGo::new("Solo", None, 1, 501);
        invalid.number_of_legs = 0;
        assert!(!storage.upsert(&invalid).unwrap().success);
        assert!(!storage.delete(Uuid::new_v4()).unwrap().success);
    }

    #[test]
    fn shut_down_bus_fails_fast() {
        let (bus_tx, _) = broadcast::channel(16);
        let dir = tempfile::tempdir().unwrap();
        let (store, _writer) = MatchStore::open(dir.path().to_path_buf()).unwrap();
        let scorer = sender("scorer", &bus_tx);
        scorer.shutdown();
        let storage = BusStorage::new(scorer, store);
        assert_matches!(
            storage.upsert(&ScoreAsYouGo::new("Solo", None, 1, 501)),
            Err(SaygError::Storage(_))
        );
    }

    #[test]
    fn updates_reach_other_transports_only() {
        let (bus_tx, _) = broadcast::channel(64);
        let scorer = BusTransport::new(sender("scorer", &bus_tx)).unwrap();
        let viewer = BusTransport::new(sender("viewer", &bus_tx)).unwrap();
        let id = Uuid::new_v4();

        let (viewer_tx, viewer_rx) = mpsc::channel();
        let mut viewer_sub = viewer
            .subscribe(
                id,
                LiveDataType::Sayg,
                Box::new(move |msg| {
                    let _ = viewer_tx.send(msg);
                }),
            )
            .unwrap();
        let (scorer_tx, scorer_rx) = mpsc::channel();
        let _scorer_sub = scorer
            .subscribe(
                id,
                LiveDataType::Sayg,
                Box::new(move |msg| {
                    let _ = scorer_tx.send(msg);
                }),
            )
            .unwrap();

        let mut sayg = ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501);
        sayg.id = Some(id);
        assert!(scorer.publish(id, LiveDataType::Sayg, &sayg).unwrap());

        let got = viewer_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_matches!(got, LiveMessage::Update { id: got_id, .. } if got_id == id);
        assert!(scorer_rx.recv_timeout(Duration::from_millis(200)).is_err());

        viewer_sub.unsubscribe();
        scorer.publish(id, LiveDataType::Sayg, &sayg).unwrap();
        assert!(viewer_rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
