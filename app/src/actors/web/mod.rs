//! Axum web server: match REST endpoints + the `/api/live` WebSocket.

pub mod routes;
pub mod ws;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::{RwLock, broadcast, oneshot};
use tower_http::cors::CorsLayer;

use crate::actors::{Actor, actor_names};
use crate::bus::{BusReceiver, BusSender};
use crate::state::SystemState;
use sayg::{ActorState, ActorStatus, ActorStatusResponse, BusEvent, BusMessage};

/// Shared state for the web layer.
pub struct WebState {
    pub root: Arc<SystemState>,
    pub bus_tx: broadcast::Sender<BusMessage>,
    /// Last status reported by each actor, served by `/api/status`.
    pub actors: RwLock<HashMap<String, ActorStatusResponse>>,
    pub addr: SocketAddr,
    pub actor_id: String,
    pub ws_count: AtomicU64,
}

impl WebState {
    /// Publish this server's status: bind address, live clients and the
    /// number of stored matches.
    pub(super) fn report(&self, status: ActorStatus) {
        let telemetry = HashMap::from([
            ("bind".to_string(), self.addr.to_string()),
            (
                "live_clients".to_string(),
                self.ws_count.load(Ordering::Relaxed).to_string(),
            ),
            ("matches".to_string(), self.root.store.count().to_string()),
        ]);
        let msg = BusMessage::new(ActorState::new(status, telemetry)).source(&self.actor_id);
        let _ = self.bus_tx.send(msg);
    }
}

/// Web server actor. Runs axum on a dedicated thread with its own runtime.
pub struct WebActor {
    addr: SocketAddr,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl WebActor {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            shutdown_tx: Mutex::new(None),
        }
    }
}

impl Actor for WebActor {
    fn start(&self, root: Arc<SystemState>, sender: BusSender, _receiver: BusReceiver) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let snap = root.system.snapshot();
        let actors = actor_names(&snap)
            .into_iter()
            .map(|(id, name)| {
                let status = ActorStatusResponse {
                    name,
                    status: ActorStatus::Disconnected,
                    telemetry: HashMap::new(),
                };
                (id, status)
            })
            .collect();
        let state = Arc::new(WebState {
            root,
            bus_tx: sender.raw_sender().clone(),
            actors: RwLock::new(actors),
            addr: self.addr,
            actor_id: sender.actor_id().to_string(),
            ws_count: AtomicU64::new(0),
        });

        let spawned = std::thread::Builder::new()
            .name(state.actor_id.clone())
            .spawn(move || match tokio::runtime::Runtime::new() {
                Ok(rt) => rt.block_on(serve(state, shutdown_rx)),
                Err(e) => tracing::error!("web server: failed to create runtime: {e}"),
            });
        if let Err(e) = spawned {
            tracing::error!("failed to spawn webserver thread: {e}");
        }
    }

    fn stop(&self) {
        let tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }
}

pub(crate) fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/sayg", post(routes::post_sayg))
        .route(
            "/api/sayg/{id}",
            get(routes::get_sayg).delete(routes::delete_sayg),
        )
        .route("/api/sayg/{id}/statistics", get(routes::get_statistics))
        .route("/api/live", get(ws::ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until shutdown. A failed bind is reported as
/// `Disconnected` and ends the actor.
async fn serve(state: Arc<WebState>, shutdown_rx: oneshot::Receiver<()>) {
    tokio::spawn(track_actor_status(
        Arc::clone(&state),
        state.bus_tx.subscribe(),
    ));

    let listener = match tokio::net::TcpListener::bind(state.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("web server: failed to bind {}: {e}", state.addr);
            state.report(ActorStatus::Disconnected);
            return;
        }
    };

    tracing::info!("web server listening on {}", state.addr);
    state.report(ActorStatus::Connected);

    let app = router(Arc::clone(&state));
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async { drop(shutdown_rx.await) })
        .await
    {
        tracing::error!("web server: {e}");
    }
}

/// Keep the per-actor status table current from `ActorStatus` events.
async fn track_actor_status(state: Arc<WebState>, mut bus_rx: broadcast::Receiver<BusMessage>) {
    loop {
        let msg = match bus_rx.recv().await {
            Ok(msg) => msg,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("web status tracker: lagged, dropped {n} events");
                continue;
            }
        };
        if let BusEvent::ActorStatus(update) = &msg.event {
            let mut actors = state.actors.write().await;
            let entry = actors
                .entry(msg.source.clone())
                .or_insert_with(|| ActorStatusResponse {
                    name: String::new(),
                    status: update.status,
                    telemetry: HashMap::new(),
                });
            entry.status = update.status;
            entry.telemetry = update.telemetry.clone();
        }
    }
}
