use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::{bearing_deg, evaluate_fix, GeofenceDecision};
use crate::models::coordinate::{Coordinate, GpsFix};
use crate::models::geofence::Geofence;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/geofence/check", post(check_geofence))
        .route("/location", post(record_location).get(latest_location))
}

#[derive(Deserialize)]
pub struct GeofenceCheckRequest {
    pub point: Coordinate,
    pub accuracy_meters: f64,
    pub geofence: Geofence,
    #[serde(default)]
    pub threshold_meters: Option<f64>,
}

#[derive(Serialize)]
pub struct GeofenceCheckResponse {
    pub geofence: String,
    pub decision: GeofenceDecision,
    pub bearing_to_center_deg: f64,
}

async fn check_geofence(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GeofenceCheckRequest>,
) -> Result<Json<GeofenceCheckResponse>, AppError> {
    let point = payload.point.validated()?;
    let center = payload.geofence.center.validated()?;

    if payload.geofence.radius_km.is_nan() || payload.geofence.radius_km < 0.0 {
        return Err(AppError::BadRequest("radius_km must be >= 0".to_string()));
    }

    let fix = GpsFix {
        coordinate: point,
        accuracy_meters: payload.accuracy_meters,
        captured_at: Utc::now(),
    };
    let threshold = payload.threshold_meters.unwrap_or(state.accuracy_threshold_m);

    Ok(Json(GeofenceCheckResponse {
        decision: evaluate_fix(&fix, &payload.geofence, threshold),
        bearing_to_center_deg: bearing_deg(&point, &center),
        geofence: payload.geofence.name,
    }))
}

/// Low-power watch tick from the platform; kept for display only.
async fn record_location(
    State(state): State<Arc<AppState>>,
    Json(fix): Json<GpsFix>,
) -> Result<Json<GpsFix>, AppError> {
    fix.coordinate.validated()?;
    state.location.record(fix.clone());
    Ok(Json(fix))
}

async fn latest_location(State(state): State<Arc<AppState>>) -> Result<Json<GpsFix>, AppError> {
    state
        .location
        .latest()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no location recorded yet".to_string()))
}
