//! System actor: always-on housekeeping that owns the match store writer.
//!
//! Every store mutation arrives as a `StorageCommand` on the bus, whether it
//! came from the REST API or from a scorer's `BusStorage`. Commands are
//! applied one at a time on this thread; a command with a `request_id` is
//! answered with a `StorageOutcome` carrying the same ID.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::actors::Actor;
use crate::bus::{BusReceiver, BusSender, PollError};
use crate::state::{MatchStoreWriter, SystemState};
use sayg::{
    ActorState, ActorStatus, AlertLevel, AlertMessage, BusEvent, BusMessage, StorageAction,
    StorageCommand, StorageOutcome, StorageReply,
};

/// System actor. Not config-driven.
///
/// Holds the sole `MatchStoreWriter`, so all store mutations flow through
/// bus events processed here.
pub struct SystemActor {
    writer: Mutex<Option<MatchStoreWriter>>,
    ready_tx: Mutex<Option<std_mpsc::SyncSender<()>>>,
}

impl SystemActor {
    pub fn new(writer: MatchStoreWriter) -> (Self, std_mpsc::Receiver<()>) {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(0);
        let actor = Self {
            writer: Mutex::new(Some(writer)),
            ready_tx: Mutex::new(Some(ready_tx)),
        };
        (actor, ready_rx)
    }
}

impl Actor for SystemActor {
    fn start(&self, _state: Arc<SystemState>, sender: BusSender, receiver: BusReceiver) {
        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        let ready_tx = self.ready_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let (Some(writer), Some(ready_tx)) = (writer, ready_tx) else {
            tracing::error!("system actor started more than once");
            return;
        };

        if let Err(e) = std::thread::Builder::new()
            .name("system".into())
            .spawn(move || run(writer, sender, receiver, ready_tx))
        {
            tracing::error!("failed to spawn system thread: {e}");
        }
    }
}

fn run(
    writer: MatchStoreWriter,
    sender: BusSender,
    mut receiver: BusReceiver,
    ready_tx: std_mpsc::SyncSender<()>,
) {
    // Signal main thread that we're up and polling.
    let _ = ready_tx.send(());
    drop(ready_tx);
    sender.send(BusMessage::new(ActorState::new(
        ActorStatus::Connected,
        Default::default(),
    )));

    loop {
        match receiver.poll() {
            Err(PollError::Shutdown) => return,
            Ok(None) => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Ok(Some(msg)) => {
                if let BusEvent::StorageCommand(cmd) = &msg.event {
                    handle_storage_command(cmd, &writer, &sender);
                }
            }
        }
    }
}

/// Apply one storage command to the store.
fn apply(action: &StorageAction, writer: &MatchStoreWriter) -> StorageReply {
    let result = match action {
        StorageAction::Upsert { data } => writer.upsert(data).map(StorageReply::Upserted),
        StorageAction::Delete { id } => writer.delete(*id).map(StorageReply::Deleted),
    };
    result.unwrap_or_else(|e| StorageReply::Failed {
        error: e.to_string(),
    })
}

fn handle_storage_command(cmd: &StorageCommand, writer: &MatchStoreWriter, sender: &BusSender) {
    let reply = apply(&cmd.action, writer);
    if let StorageReply::Failed { error } = &reply {
        tracing::warn!("store write failed: {error}");
        sender.send(BusMessage::new(AlertMessage {
            level: AlertLevel::Error,
            message: format!("store write failed: {error}"),
        }));
    }
    if let Some(request_id) = &cmd.request_id {
        sender.send(BusMessage::new(StorageOutcome {
            request_id: request_id.clone(),
            reply,
        }));
    }
}
