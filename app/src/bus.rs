//! Bus abstraction layer. Wraps `tokio::sync::broadcast` so callers never
//! touch the broadcast types directly.
//!
//! Actors and the terminal scorer run on plain threads, so the receiver side
//! offers non-blocking `poll()` plus a sleeping `wait_for()` for
//! request-reply exchanges.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use sayg::BusMessage;

/// Sleep between polls while waiting on the bus.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// PollError
// ---------------------------------------------------------------------------

/// Error from `BusReceiver::poll()`: the bus is closed or the owner's
/// shutdown flag is set.
#[derive(Debug, PartialEq, Eq)]
pub enum PollError {
    Shutdown,
}

// ---------------------------------------------------------------------------
// BusSender
// ---------------------------------------------------------------------------

/// Cloneable sender that stamps `source` on every outbound message.
#[derive(Clone)]
pub struct BusSender {
    actor_id: String,
    inner: broadcast::Sender<BusMessage>,
    shutdown: Arc<AtomicBool>,
}

impl BusSender {
    pub fn new(
        actor_id: String,
        inner: broadcast::Sender<BusMessage>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            actor_id,
            inner,
            shutdown,
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Access the underlying broadcast sender (e.g. for WebState).
    pub fn raw_sender(&self) -> &broadcast::Sender<BusMessage> {
        &self.inner
    }

    /// Send a message stamped with this sender's ID. A bus with no
    /// receivers drops the message.
    pub fn send(&self, mut msg: BusMessage) {
        msg.source = self.actor_id.clone();
        let _ = self.inner.send(msg);
    }

    /// Create a receiver on this bus sharing this sender's shutdown flag.
    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            inner: self.inner.subscribe(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Raise the shared shutdown flag.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// BusReceiver
// ---------------------------------------------------------------------------

pub struct BusReceiver {
    inner: broadcast::Receiver<BusMessage>,
    shutdown: Arc<AtomicBool>,
}

impl BusReceiver {
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Non-blocking drain: the next message, `Ok(None)` if empty, or
    /// `Err(PollError::Shutdown)` if the bus is closed or shutdown was raised.
    pub fn poll(&mut self) -> Result<Option<BusMessage>, PollError> {
        if self.is_shutdown() {
            return Err(PollError::Shutdown);
        }
        loop {
            match self.inner.try_recv() {
                Ok(msg) => return Ok(Some(msg)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(PollError::Shutdown),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("bus: lagged, dropped {n} events");
                    continue;
                }
            }
        }
    }

    /// Block until `pick` accepts a message or `timeout` elapses. Messages
    /// `pick` declines are discarded.
    pub fn wait_for<T>(
        &mut self,
        timeout: Duration,
        mut pick: impl FnMut(&BusMessage) -> Option<T>,
    ) -> Result<Option<T>, PollError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.poll()? {
                Some(msg) => {
                    if let Some(found) = pick(&msg) {
                        return Ok(Some(found));
                    }
                }
                None => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sayg::{AlertLevel, AlertMessage, BusEvent};

    use super::*;

    fn alert(text: &str) -> BusMessage {
        BusMessage::new(AlertMessage {
            level: AlertLevel::Warn,
            message: text.into(),
        })
    }

    fn bus(id: &str) -> BusSender {
        let (tx, _) = broadcast::channel(16);
        BusSender::new(id.into(), tx, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn send_stamps_the_source() {
        let sender = bus("scorer");
        let mut rx = sender.subscribe();
        sender.send(alert("hello").source("somebody-else"));
        let msg = rx.poll().unwrap().unwrap();
        assert_eq!(msg.source, "scorer");
        assert_eq!(rx.poll().unwrap().map(|m| m.source), None);
    }

    #[test]
    fn shutdown_stops_polling() {
        let sender = bus("system");
        let mut rx = sender.subscribe();
        sender.shutdown();
        assert_eq!(rx.poll().unwrap_err(), PollError::Shutdown);
    }

    #[test]
    fn wait_for_skips_unwanted_messages() {
        let sender = bus("web");
        let mut rx = sender.subscribe();
        sender.send(alert("first"));
        sender.send(alert("second"));
        let found = rx
            .wait_for(Duration::from_millis(100), |msg| match &msg.event {
                BusEvent::Alert(a) if a.message == "second" => Some(a.message.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(found.as_deref(), Some("second"));
    }

    #[test]
    fn wait_for_gives_up_after_the_timeout() {
        let sender = bus("web");
        let mut rx = sender.subscribe();
        let found: Option<()> = rx.wait_for(Duration::from_millis(30), |_| None).unwrap();
        assert!(found.is_none());
    }
}
