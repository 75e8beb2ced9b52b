use serde::Serialize;

use crate::models::coordinate::{Coordinate, GpsFix};
use crate::models::geofence::{Geofence, GeofenceStatus};

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub const DEFAULT_ACCURACY_THRESHOLD_M: f64 = 50.0;

/// Haversine great-circle distance in kilometres.
pub fn distance_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Inclusive boundary. Invalid coordinates are never inside anything.
pub fn is_within_geofence(point: &Coordinate, center: &Coordinate, radius_km: f64) -> bool {
    if !is_valid_coordinate(point) || !is_valid_coordinate(center) {
        return false;
    }
    distance_km(point, center) <= radius_km
}

/// Initial compass bearing in degrees, normalized into [0, 360).
pub fn bearing_deg(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lng = (to.longitude - from.longitude).to_radians();

    let y = delta_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    if bearing >= 360.0 { 0.0 } else { bearing }
}

/// Midpoint along the great-circle arc between `a` and `b`.
pub fn midpoint(a: &Coordinate, b: &Coordinate) -> Coordinate {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let lng1 = a.longitude.to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let bx = lat2.cos() * delta_lng.cos();
    let by = lat2.cos() * delta_lng.sin();

    let lat = (lat1.sin() + lat2.sin()).atan2(((lat1.cos() + bx).powi(2) + by * by).sqrt());
    let lng = lng1 + by.atan2(lat1.cos() + bx);

    Coordinate {
        latitude: lat.to_degrees(),
        longitude: normalize_longitude(lng.to_degrees()),
    }
}

fn normalize_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lng > 0.0 { 180.0 } else { wrapped }
}

pub fn is_valid_coordinate(c: &Coordinate) -> bool {
    c.latitude.is_finite()
        && c.longitude.is_finite()
        && (-90.0..=90.0).contains(&c.latitude)
        && (-180.0..=180.0).contains(&c.longitude)
}

pub fn is_acceptable_accuracy(accuracy_meters: f64, threshold_meters: f64) -> bool {
    accuracy_meters >= 0.0 && accuracy_meters <= threshold_meters
}

pub fn geofence_status(distance_km: f64, radius_km: f64) -> GeofenceStatus {
    let within_geofence = distance_km <= radius_km;

    let percentage_inside = if !within_geofence {
        0.0
    } else if radius_km > 0.0 {
        (100.0 - distance_km / radius_km * 100.0).clamp(0.0, 100.0)
    } else {
        100.0
    };

    let message = if within_geofence {
        format!(
            "Inside geofence, {} from center",
            format_distance(distance_km)
        )
    } else {
        format!(
            "Outside geofence by {}",
            format_distance(distance_km - radius_km)
        )
    };

    GeofenceStatus {
        distance_km,
        within_geofence,
        percentage_inside,
        message,
    }
}

/// Metres below one kilometre, kilometres with two decimals otherwise.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{:.0} m", km * 1000.0)
    } else {
        format!("{km:.2} km")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GeofenceDecision {
    Decided(GeofenceStatus),
    InaccurateFix {
        accuracy_meters: f64,
        threshold_meters: f64,
    },
    InvalidFix,
}

/// Geofence membership for a raw fix, gated on accuracy first.
pub fn evaluate_fix(fix: &GpsFix, geofence: &Geofence, threshold_meters: f64) -> GeofenceDecision {
    if !is_valid_coordinate(&fix.coordinate) || !is_valid_coordinate(&geofence.center) {
        return GeofenceDecision::InvalidFix;
    }

    if !is_acceptable_accuracy(fix.accuracy_meters, threshold_meters) {
        return GeofenceDecision::InaccurateFix {
            accuracy_meters: fix.accuracy_meters,
            threshold_meters,
        };
    }

    let distance = distance_km(&fix.coordinate, &geofence.center);
    GeofenceDecision::Decided(geofence_status(distance, geofence.radius_km))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn c(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate {
            latitude,
            longitude,
        }
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = c(53.5511, 9.9937);
        assert_eq!(distance_km(&p, &p), 0.0);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = c(51.5074, -0.1278);
        let paris = c(48.8566, 2.3522);
        assert!((distance_km(&london, &paris) - 343.0).abs() < 5.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (c(40.7128, -74.006), c(34.0522, -118.2437)),
            (c(-33.8688, 151.2093), c(35.6762, 139.6503)),
            (c(0.0, 179.9), c(0.0, -179.9)),
            (c(89.9, 0.0), c(-89.9, 180.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(distance_km(&a, &b), distance_km(&b, &a));
        }
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        for lat in [-60.0, -10.0, 0.0, 33.3, 45.0, 88.0] {
            let a = c(lat, 17.0);
            let b = c(lat + 1.0, 17.0);
            assert!((distance_km(&a, &b) - 111.0).abs() < 1.0, "lat {lat}");
        }
    }

    #[test]
    fn antimeridian_is_not_special_cased() {
        let east = c(0.0, 179.95);
        let west = c(0.0, -179.95);
        let d = distance_km(&east, &west);
        assert!(d < 12.0, "expected ~11 km across the antimeridian, got {d}");
    }

    #[test]
    fn geofence_boundary_is_inclusive() {
        let center = c(40.7128, -74.006);
        let point = c(40.7138, -74.006);
        let exact = distance_km(&point, &center);
        assert!(is_within_geofence(&point, &center, exact));
        assert!(!is_within_geofence(&point, &center, exact * 0.999));
    }

    #[test]
    fn geofence_rejects_invalid_point() {
        let center = c(0.0, 0.0);
        assert!(!is_within_geofence(&c(f64::NAN, 0.0), &center, 10_000.0));
    }

    #[test]
    fn validity_checks() {
        assert!(!is_valid_coordinate(&c(91.0, 0.0)));
        assert!(!is_valid_coordinate(&c(0.0, 181.0)));
        assert!(!is_valid_coordinate(&c(f64::NAN, 0.0)));
        assert!(is_valid_coordinate(&c(90.0, 180.0)));
        assert!(is_valid_coordinate(&c(-90.0, -180.0)));
        assert!(is_valid_coordinate(&c(0.0, 0.0)));
    }

    #[test]
    fn accuracy_threshold() {
        assert!(is_acceptable_accuracy(25.0, DEFAULT_ACCURACY_THRESHOLD_M));
        assert!(!is_acceptable_accuracy(75.0, DEFAULT_ACCURACY_THRESHOLD_M));
        assert!(is_acceptable_accuracy(100.0, 150.0));
        assert!(is_acceptable_accuracy(50.0, DEFAULT_ACCURACY_THRESHOLD_M));
        assert!(!is_acceptable_accuracy(f64::NAN, DEFAULT_ACCURACY_THRESHOLD_M));
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = c(0.0, 0.0);
        assert!((bearing_deg(&origin, &c(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_deg(&origin, &c(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_deg(&origin, &c(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_deg(&origin, &c(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn bearing_stays_in_range() {
        let b = bearing_deg(&c(10.0, 10.0), &c(10.5, 9.5));
        assert!((0.0..360.0).contains(&b));
    }

    #[test]
    fn midpoint_follows_great_circle() {
        let a = c(60.0, -30.0);
        let b = c(60.0, 30.0);
        let mid = midpoint(&a, &b);

        assert!(mid.latitude > 60.0, "great-circle midpoint bows poleward");
        assert!(mid.longitude.abs() < 1e-9);
        let da = distance_km(&a, &mid);
        let db = distance_km(&mid, &b);
        assert!((da - db).abs() < 1e-6);
    }

    #[test]
    fn midpoint_across_antimeridian() {
        let mid = midpoint(&c(0.0, 170.0), &c(0.0, -170.0));
        assert!((mid.longitude.abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn status_inside_reports_half_way() {
        let status = geofence_status(0.05, 0.1);
        assert!(status.within_geofence);
        assert!((status.percentage_inside - 50.0).abs() < 1e-9);
        assert!(status.message.contains("50 m"));
    }

    #[test]
    fn status_outside_reports_overflow_in_km() {
        let status = geofence_status(2.0, 0.5);
        assert!(!status.within_geofence);
        assert_eq!(status.percentage_inside, 0.0);
        assert!(status.message.contains("1.50 km"), "{}", status.message);
    }

    #[test]
    fn status_outside_in_metres() {
        let status = geofence_status(0.35, 0.1);
        assert!(status.message.contains("250 m"), "{}", status.message);
    }

    #[test]
    fn inaccurate_fix_is_not_decided() {
        let geofence = Geofence {
            name: "depot".into(),
            center: c(40.7128, -74.006),
            radius_km: 0.1,
        };
        let fix = GpsFix {
            coordinate: c(40.7128, -74.006),
            accuracy_meters: 80.0,
            captured_at: Utc::now(),
        };

        assert!(matches!(
            evaluate_fix(&fix, &geofence, DEFAULT_ACCURACY_THRESHOLD_M),
            GeofenceDecision::InaccurateFix { .. }
        ));
        assert!(matches!(
            evaluate_fix(&fix, &geofence, 100.0),
            GeofenceDecision::Decided(GeofenceStatus {
                within_geofence: true,
                ..
            })
        ));
    }

    #[test]
    fn device_leaving_job_site() {
        let center = c(40.7128, -74.006);
        assert!(is_within_geofence(&c(40.7128, -74.006), &center, 0.1));

        let moved = c(40.7238, -74.006);
        let d = distance_km(&moved, &center);
        assert!((d - 1.22).abs() < 0.05);
        assert!(!is_within_geofence(&moved, &center, 0.1));
    }
}
