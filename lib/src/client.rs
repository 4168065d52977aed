//! Blocking WebSocket client for a remote live channel.
//!
//! One socket per transport. A reader thread owns delivery: it polls the
//! socket with a short read timeout so writers can take the lock between
//! polls, and it calls subscriber handlers while holding the subscriber
//! table, which is what makes `unsubscribe` final.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use uuid::Uuid;

use crate::{
    ClientFrame, LiveDataType, LiveHandler, LiveMessage, LiveTransport, SaygError, ScoreAsYouGo,
    ServerFrame, Subscription,
};

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const HANDSHAKE_ATTEMPTS: usize = 100;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn transport_err(e: impl std::fmt::Display) -> SaygError {
    SaygError::Transport(e.to_string())
}

fn is_timeout(e: &tungstenite::Error) -> bool {
    matches!(e, tungstenite::Error::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut))
}

struct Inner {
    socket: Mutex<Socket>,
    subscribers: Mutex<HashMap<u64, (Uuid, LiveHandler)>>,
    next_key: AtomicU64,
    stop: AtomicBool,
}

impl Inner {
    fn send(&self, frame: &ClientFrame) -> Result<(), SaygError> {
        let text = serde_json::to_string(frame).map_err(transport_err)?;
        lock(&self.socket)
            .send(Message::Text(text.into()))
            .map_err(transport_err)
    }

    fn dispatch(&self, message: LiveMessage) {
        let subscribers = lock(&self.subscribers);
        for (id, handler) in subscribers.values() {
            match &message {
                LiveMessage::Update { id: update_id, .. } if update_id != id => {}
                _ => handler(message.clone()),
            }
        }
    }
}

/// A `LiveTransport` talking to a remote `/api/live` endpoint.
pub struct WsLiveTransport {
    inner: Arc<Inner>,
    source_id: String,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsLiveTransport {
    /// Connect, perform the start/init handshake and spawn the reader.
    pub fn connect(url: &str, name: &str) -> Result<Self, SaygError> {
        let (mut socket, _) = tungstenite::connect(url).map_err(transport_err)?;
        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream
                .set_read_timeout(Some(READ_TIMEOUT))
                .map_err(transport_err)?;
        }

        let start = serde_json::to_string(&ClientFrame::Start { name: name.into() })
            .map_err(transport_err)?;
        socket
            .send(Message::Text(start.into()))
            .map_err(transport_err)?;
        let source_id = await_init(&mut socket)?;
        tracing::info!("live client {source_id} connected to {url}");

        let inner = Arc::new(Inner {
            socket: Mutex::new(socket),
            subscribers: Mutex::new(HashMap::new()),
            next_key: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        });
        let reader_inner = Arc::clone(&inner);
        let reader = std::thread::Builder::new()
            .name("live-client".into())
            .spawn(move || read_loop(reader_inner))
            .map_err(transport_err)?;

        Ok(Self {
            inner,
            source_id,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// The id the server assigned this connection.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

fn await_init(socket: &mut Socket) -> Result<String, SaygError> {
    for _ in 0..HANDSHAKE_ATTEMPTS {
        match socket.read() {
            Ok(Message::Text(text)) => {
                if let Ok(ServerFrame::Init { source_id }) = serde_json::from_str(text.as_str()) {
                    return Ok(source_id);
                }
            }
            Ok(Message::Close(_)) => {
                return Err(SaygError::Transport("closed during handshake".into()));
            }
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {}
            Err(e) => return Err(transport_err(e)),
        }
    }
    Err(SaygError::Timeout("live channel handshake"))
}

fn read_loop(inner: Arc<Inner>) {
    while !inner.stop.load(Ordering::SeqCst) {
        let read = lock(&inner.socket).read();
        match read {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(text.as_str()) {
                Ok(frame) => {
                    if let Some(message) = frame.into_live_message() {
                        inner.dispatch(message);
                    }
                }
                Err(e) => tracing::warn!("unreadable live frame: {e}"),
            },
            Ok(Message::Close(_)) => {
                inner.dispatch(LiveMessage::Error {
                    message: "live channel closed".into(),
                });
                break;
            }
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {
                // Let writers in before the next poll.
                std::thread::yield_now();
            }
            Err(e) => {
                if !inner.stop.load(Ordering::SeqCst) {
                    tracing::warn!("live channel read failed: {e}");
                    inner.dispatch(LiveMessage::Error {
                        message: e.to_string(),
                    });
                }
                break;
            }
        }
    }
    tracing::debug!("live client reader exiting");
}

struct WsSubscription {
    inner: Arc<Inner>,
    key: u64,
    id: Uuid,
    closed: bool,
}

impl Subscription for WsSubscription {
    fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let last_for_id = {
            let mut subscribers = lock(&self.inner.subscribers);
            subscribers.remove(&self.key);
            !subscribers.values().any(|(id, _)| *id == self.id)
        };
        if last_for_id {
            if let Err(e) = self.inner.send(&ClientFrame::Unsubscribe { id: self.id }) {
                tracing::debug!("unsubscribe for {} not sent: {e}", self.id);
            }
        }
    }
}

impl Drop for WsSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl LiveTransport for WsLiveTransport {
    fn subscribe(
        &self,
        id: Uuid,
        data_type: LiveDataType,
        handler: LiveHandler,
    ) -> Result<Box<dyn Subscription>, SaygError> {
        self.inner.send(&ClientFrame::Subscribe { id, data_type })?;
        let key = self.inner.next_key.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.subscribers).insert(key, (id, handler));
        Ok(Box::new(WsSubscription {
            inner: Arc::clone(&self.inner),
            key,
            id,
            closed: false,
        }))
    }

    fn publish(
        &self,
        id: Uuid,
        data_type: LiveDataType,
        data: &ScoreAsYouGo,
    ) -> Result<bool, SaygError> {
        self.inner.send(&ClientFrame::Publish {
            id,
            data_type,
            data: Box::new(data.clone()),
        })?;
        Ok(true)
    }
}

impl Drop for WsLiveTransport {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        let _ = lock(&self.inner.socket).close(None);
        if let Some(handle) = lock(&self.reader).take() {
            let _ = handle.join();
        }
    }
}
