//! WebSocket live channel: init handshake, then per-match subscriptions.
//!
//! Protocol:
//!   1. Client sends:  `{ "type": "start", "name": "Board 3" }`
//!   2. Server sends:  `{ "type": "init", "source_id": "ws.abc123" }`
//!   3. Client sends `subscribe` / `unsubscribe` / `publish` frames; the
//!      server relays every publish from another source on a subscribed id as
//!      an `update` frame, and answers bad frames with `error`.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::WebState;
use crate::state::config;
use sayg::{ActorStatus, BusEvent, BusMessage, ClientFrame, LiveUpdate, ServerFrame};

type Subscriptions = Arc<Mutex<HashSet<Uuid>>>;

fn lock(subscriptions: &Subscriptions) -> MutexGuard<'_, HashSet<Uuid>> {
    subscriptions.lock().unwrap_or_else(|e| e.into_inner())
}

/// GET /api/live: upgrade to WebSocket.
pub async fn ws_upgrade(
    State(state): State<Arc<WebState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<WebState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Phase 1: Wait for "start" message from client
    let client_name = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Ok(ClientFrame::Start { name }) =
                    serde_json::from_str::<ClientFrame>(&text)
                {
                    break if name.is_empty() {
                        "anonymous".to_string()
                    } else {
                        name
                    };
                }
                // Not a start message, keep waiting
            }
            Some(Ok(Message::Close(_))) | None => return,
            _ => continue,
        }
    };

    // Phase 2: Send "init" response with source_id
    let source_id = format!("ws.{}", config::generate_id());
    let init = ServerFrame::Init {
        source_id: source_id.clone(),
    };
    let Ok(init) = serde_json::to_string(&init) else {
        return;
    };
    if ws_tx.send(Message::text(init)).await.is_err() {
        return;
    }
    state.ws_count.fetch_add(1, Ordering::Relaxed);
    state.report(ActorStatus::Connected);
    tracing::info!("live: client '{client_name}' connected (source_id={source_id})");

    // Phase 3: relay bus updates out, client frames in
    let subscriptions: Subscriptions = Arc::new(Mutex::new(HashSet::new()));
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut bus_rx = state.bus_tx.subscribe();

    let send_subs = Arc::clone(&subscriptions);
    let send_source = source_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                received = bus_rx.recv() => match received {
                    Ok(msg) => {
                        let subs = lock(&send_subs);
                        relay_frame(&msg, &send_source, &subs)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("live: {send_source} lagged {n}");
                        None
                    }
                },
                reply = reply_rx.recv() => match reply {
                    Some(frame) => Some(frame),
                    None => break,
                },
            };
            let Some(frame) = frame else {
                continue;
            };
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_tx.send(Message::text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_source = source_id.clone();
    let bus_tx = state.bus_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match handle_client_frame(&text, &subscriptions) {
                    FrameAction::Ignore => {}
                    FrameAction::Reply(frame) => {
                        if reply_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    FrameAction::Publish(update) => {
                        let _ = bus_tx.send(BusMessage::new(update).source(&recv_source));
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.ws_count.fetch_sub(1, Ordering::Relaxed);
    state.report(ActorStatus::Connected);
    tracing::info!("live: client '{client_name}' disconnected (source_id={source_id})");
}

/// What to do with one client frame.
#[derive(Debug)]
enum FrameAction {
    Ignore,
    Reply(ServerFrame),
    Publish(LiveUpdate),
}

fn handle_client_frame(text: &str, subscriptions: &Subscriptions) -> FrameAction {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            return FrameAction::Reply(ServerFrame::Error {
                message: format!("malformed frame: {e}"),
            });
        }
    };
    match frame {
        ClientFrame::Start { .. } => FrameAction::Ignore,
        ClientFrame::Subscribe { id, .. } => {
            lock(subscriptions).insert(id);
            FrameAction::Ignore
        }
        ClientFrame::Unsubscribe { id } => {
            lock(subscriptions).remove(&id);
            FrameAction::Ignore
        }
        ClientFrame::Publish {
            id,
            data_type,
            mut data,
        } => {
            if let Some(data_id) = data.id
                && data_id != id
            {
                return FrameAction::Reply(ServerFrame::Error {
                    message: format!("publish for {id} carries match {data_id}"),
                });
            }
            data.id = Some(id);
            FrameAction::Publish(LiveUpdate {
                id,
                data_type,
                data,
            })
        }
    }
}

/// The `update` frame for `msg`, if this client should see it. A client
/// never receives its own publishes back.
fn relay_frame(
    msg: &BusMessage,
    source_id: &str,
    subscriptions: &HashSet<Uuid>,
) -> Option<ServerFrame> {
    match &msg.event {
        BusEvent::LiveUpdate(update)
            if msg.source != source_id && subscriptions.contains(&update.id) =>
        {
            Some(ServerFrame::Update {
                id: update.id,
                data: update.data.clone(),
            })
        }
        _ => None,
    }
}
