use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::is_valid_coordinate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Builds a coordinate, rejecting NaN and out-of-range values instead of clamping them.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validated()
    }

    pub fn validated(self) -> Result<Self, AppError> {
        if is_valid_coordinate(&self) {
            Ok(self)
        } else {
            Err(AppError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// "lat,lng" with six decimals, the form the status-update RPC expects.
    pub fn to_rpc_string(&self) -> String {
        format!("{:.6},{:.6}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsFix {
    pub coordinate: Coordinate,
    pub accuracy_meters: f64,
    pub captured_at: DateTime<Utc>,
}

impl GpsFix {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.captured_at
    }
}
