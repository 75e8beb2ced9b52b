use serde::{Deserialize, Serialize};

use crate::models::coordinate::Coordinate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Geofence {
    pub name: String,
    pub center: Coordinate,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeofenceStatus {
    pub distance_km: f64,
    pub within_geofence: bool,
    pub percentage_inside: f64,
    pub message: String,
}
