use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::controller::TransitionRequest;
use crate::engine::gps::ReportedFix;
use crate::error::AppError;
use crate::models::coordinate::GpsFix;
use crate::models::delivery::{DeliveryView, TransitionReceipt};
use crate::state::AppState;

pub fn router(max_photo_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/status", post(request_transition))
        .route(
            "/deliveries/:id/photos",
            post(upload_photo).layer(DefaultBodyLimit::max(max_photo_bytes)),
        )
}

#[derive(Deserialize)]
pub struct TransitionPayload {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Fix the client captured when the worker tapped the button.
    #[serde(default)]
    pub fix: Option<GpsFix>,
}

async fn request_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<TransitionPayload>,
) -> Result<Json<TransitionReceipt>, AppError> {
    let request = TransitionRequest {
        target_id: id,
        new_status: payload.status,
        notes: payload.notes,
    };

    let receipt = match payload.fix {
        Some(fix) => {
            state
                .controller
                .request_transition_with(request, &ReportedFix(Some(fix)))
                .await?
        }
        None => state.controller.request_transition(request).await?,
    };

    Ok(Json(receipt))
}

async fn upload_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TransitionReceipt>, AppError> {
    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("content-type header is required".to_string()))?;

    if !mime_type.starts_with("image/") {
        return Err(AppError::BadRequest(format!(
            "expected an image content type, got {mime_type}"
        )));
    }

    let receipt = state.controller.capture_photo(&id, &body, mime_type).await?;
    Ok(Json(receipt))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryView>, AppError> {
    let view = state
        .sync
        .delivery_view(&id)
        .ok_or_else(|| AppError::NotFound(format!("no confirmed status for delivery {id}")))?;

    Ok(Json(view))
}
