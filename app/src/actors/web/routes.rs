//! REST endpoint handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::WebState;
use sayg::{
    BusEvent, BusMessage, DeleteResult, MatchStatistics, ScoreAsYouGo, StatusResponse,
    StorageAction, StorageCommand, StorageReply, UpsertResult, project_match,
};

const STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// GET /api/status
pub async fn get_status(State(state): State<Arc<WebState>>) -> Json<StatusResponse> {
    let actors = state.actors.read().await.clone();
    Json(StatusResponse {
        actors,
        matches: state.root.store.count(),
        live_clients: state.ws_count.load(std::sync::atomic::Ordering::Relaxed) as usize,
    })
}

/// GET /api/sayg/{id}
pub async fn get_sayg(
    State(state): State<Arc<WebState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreAsYouGo>, StatusCode> {
    state
        .root
        .store
        .get(id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/sayg/{id}/statistics
pub async fn get_statistics(
    State(state): State<Arc<WebState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchStatistics>, StatusCode> {
    let sayg = state.root.store.get(id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(project_match(&sayg)))
}

/// POST /api/sayg: upsert via bus request-reply.
pub async fn post_sayg(
    State(state): State<Arc<WebState>>,
    Json(data): Json<ScoreAsYouGo>,
) -> Json<UpsertResult> {
    let action = StorageAction::Upsert {
        data: Box::new(data),
    };
    Json(match request_storage(&state, action).await {
        Ok(StorageReply::Upserted(result)) => result,
        Ok(StorageReply::Failed { error }) => UpsertResult::failed(vec![error]),
        Ok(other) => UpsertResult::failed(vec![format!("unexpected store reply: {other:?}")]),
        Err(e) => UpsertResult::failed(vec![e.into()]),
    })
}

/// DELETE /api/sayg/{id}
pub async fn delete_sayg(
    State(state): State<Arc<WebState>>,
    Path(id): Path<Uuid>,
) -> Json<DeleteResult> {
    Json(match request_storage(&state, StorageAction::Delete { id }).await {
        Ok(StorageReply::Deleted(result)) => result,
        Ok(StorageReply::Failed { error }) => DeleteResult::failed(vec![error]),
        Ok(other) => DeleteResult::failed(vec![format!("unexpected store reply: {other:?}")]),
        Err(e) => DeleteResult::failed(vec![e.into()]),
    })
}

/// Emit a `StorageCommand` on the bus and wait for the `StorageOutcome`
/// with a matching `request_id`. SystemActor owns the store.
async fn request_storage(
    state: &WebState,
    action: StorageAction,
) -> Result<StorageReply, &'static str> {
    let request_id = crate::state::config::generate_id();
    let mut bus_rx = state.bus_tx.subscribe();

    let _ = state.bus_tx.send(
        BusMessage::new(StorageCommand {
            request_id: Some(request_id.clone()),
            action,
        })
        .source(&state.actor_id),
    );

    let result = tokio::time::timeout(STORAGE_TIMEOUT, async {
        loop {
            match bus_rx.recv().await {
                Ok(msg) => {
                    if let BusEvent::StorageOutcome(outcome) = msg.event
                        && outcome.request_id == request_id
                    {
                        return Some(outcome.reply);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    })
    .await;

    match result {
        Ok(Some(reply)) => Ok(reply),
        Ok(None) => Err("bus closed"),
        Err(_) => {
            tracing::warn!("store request {request_id}: timed out waiting for StorageOutcome");
            Err("timed out waiting for the store")
        }
    }
}
