use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::connectivity::ConnectivityReport;
use crate::engine::sync::DrainReport;
use crate::error::AppError;
use crate::models::action::ActionSummary;
use crate::models::event::EngineEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(sync_status))
        .route("/queue", get(list_queue).delete(clear_queue))
        .route("/sync", post(trigger_sync))
        .route("/connectivity", post(report_connectivity))
}

#[derive(Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub pending_actions: usize,
    pub draining: bool,
}

#[derive(Serialize)]
pub struct ClearedQueue {
    pub dropped: usize,
}

#[derive(Deserialize)]
pub struct ConnectivityPayload {
    pub online: bool,
}

async fn sync_status(State(state): State<Arc<AppState>>) -> Json<SyncStatus> {
    Json(SyncStatus {
        online: state.network.is_online(),
        pending_actions: state.queue.len(),
        draining: state.sync.is_draining(),
    })
}

async fn list_queue(State(state): State<Arc<AppState>>) -> Json<Vec<ActionSummary>> {
    let pending = state
        .queue
        .snapshot()
        .iter()
        .map(|action| action.summary())
        .collect();

    Json(pending)
}

async fn clear_queue(State(state): State<Arc<AppState>>) -> Result<Json<ClearedQueue>, AppError> {
    let dropped = state.queue.clear()?;
    state.metrics.pending_actions.set(0);
    let _ = state.events_tx.send(EngineEvent::QueueCleared { dropped });

    Ok(Json(ClearedQueue { dropped }))
}

async fn trigger_sync(State(state): State<Arc<AppState>>) -> Json<DrainReport> {
    Json(state.sync.drain().await)
}

async fn report_connectivity(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConnectivityPayload>,
) -> Json<ConnectivityReport> {
    Json(state.monitor.report(payload.online).await)
}
