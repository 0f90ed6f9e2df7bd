//! Geographic primitives: validated coordinates, haversine distance, and the
//! constant-speed travel model used whenever no live directions data is
//! available.
//!
//! Travel in a disaster area is assumed to average 5 km/h (debris, blocked
//! roads, on-foot stretches), so fallback durations are deliberately
//! pessimistic compared to normal driving estimates.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Assumed average travel speed through a disaster area, in km/h.
pub const DISASTER_SPEED_KMH: f64 = 5.0;

/// A point on Earth's surface. Immutable once constructed; build one through
/// [`Coordinate::new`] so the range invariants hold everywhere downstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    /// Validate and construct a coordinate. Latitude must be in [-90, 90],
    /// longitude in [-180, 180], both finite.
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoreError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoreError::InvalidCoordinate { lat, lng });
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoreError::InvalidCoordinate { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }
}

/// Haversine great-circle distance between two coordinates, in kilometres.
///
/// Symmetric, zero iff both points are equal.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Maximum pairwise distance among a set of points, in kilometres.
///
/// O(n²); intended for cluster-sized inputs (a few hundred points at most).
/// Returns 0.0 for zero or one points.
pub fn cluster_spread(points: &[Coordinate]) -> f64 {
    let mut max = 0.0f64;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let d = distance_km(*a, *b);
            if d > max {
                max = d;
            }
        }
    }
    max
}

/// Travel time in minutes at the disaster-area average speed (fractional).
pub fn travel_minutes(distance_km: f64) -> f64 {
    (distance_km / DISASTER_SPEED_KMH) * 60.0
}

/// Fallback travel duration in whole minutes: ceil(d / 5 km/h * 60).
pub fn fallback_duration_minutes(distance_km: f64) -> u64 {
    travel_minutes(distance_km).ceil() as u64
}
