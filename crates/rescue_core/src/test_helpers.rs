//! Test helpers: seeded sample data and a recording notifier.
//!
//! Shared across test files to cut setup duplication. Sampling uses a seeded
//! RNG so scenarios are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::error::NotifyError;
use crate::geo::Coordinate;
use crate::model::{Accessibility, HazardKind, HelpRequest, InjuryLevel, NewRequest, Responder};
use crate::notify::{Notification, Notifier};

/// Default bounding box for sample data: San Francisco Bay Area (approx).
pub const SAMPLE_LAT_MIN: f64 = 37.6;
pub const SAMPLE_LAT_MAX: f64 = 37.85;
pub const SAMPLE_LNG_MIN: f64 = -122.55;
pub const SAMPLE_LNG_MAX: f64 = -122.35;

/// A fixed valid coordinate inside the sample bounding box.
pub fn sample_coordinate() -> Coordinate {
    Coordinate::new(37.7749, -122.4194).expect("sample coordinate is valid")
}

/// Sample `count` coordinates uniformly from the default bounding box.
pub fn sample_coordinates(seed: u64, count: usize) -> Vec<Coordinate> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let lat = rng.gen_range(SAMPLE_LAT_MIN..=SAMPLE_LAT_MAX);
            let lng = rng.gen_range(SAMPLE_LNG_MIN..=SAMPLE_LNG_MAX);
            Coordinate::new(lat, lng).expect("sampled coordinate is in range")
        })
        .collect()
}

/// A plausible new flooding request at the given location.
pub fn new_request_at(location: Coordinate) -> NewRequest {
    NewRequest {
        requester_ref: "victim-1".into(),
        location,
        hazard: HazardKind::Flooding,
        description: "water rising fast".into(),
        people_affected: 2,
        injury_level: None,
        accessibility: Accessibility::Difficult,
    }
}

/// A stored request with explicit hazard and injury, for scoring tests.
pub fn request_with(
    id: &str,
    location: Coordinate,
    hazard: HazardKind,
    injury_level: Option<InjuryLevel>,
    people_affected: u32,
) -> HelpRequest {
    HelpRequest {
        id: id.into(),
        requester_ref: "victim-1".into(),
        location,
        hazard,
        description: "needs help".into(),
        people_affected,
        injury_level,
        accessibility: Accessibility::Unknown,
        status: crate::model::RequestStatus::Open,
        created_at: chrono::Utc::now(),
        assigned_responder_id: None,
    }
}

/// An available responder with a location and a device token.
pub fn responder_at(id: &str, location: Coordinate) -> Responder {
    let mut responder = Responder::new(id, format!("Responder {id}"));
    responder.current_location = Some(location);
    responder.device_token = Some(format!("token-{id}"));
    responder
}

/// Notifier that records every send for assertions. Optionally fails
/// deliveries to verify that notification failure is tolerated.
#[derive(Default)]
pub struct RecordingNotifier {
    pub fail_deliveries: bool,
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_deliveries: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().expect("recording lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, token: &str, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail_deliveries {
            return Err(NotifyError::Delivery("simulated failure".into()));
        }
        self.sent
            .lock()
            .expect("recording lock")
            .push((token.to_string(), notification.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let a = sample_coordinates(42, 10);
        let b = sample_coordinates(42, 10);
        assert_eq!(a.len(), 10);
        assert_eq!(
            a.iter().map(|c| (c.lat(), c.lng())).collect::<Vec<_>>(),
            b.iter().map(|c| (c.lat(), c.lng())).collect::<Vec<_>>()
        );
    }

    #[test]
    fn sampled_points_stay_inside_the_bbox() {
        for c in sample_coordinates(7, 50) {
            assert!((SAMPLE_LAT_MIN..=SAMPLE_LAT_MAX).contains(&c.lat()));
            assert!((SAMPLE_LNG_MIN..=SAMPLE_LNG_MAX).contains(&c.lng()));
        }
    }
}
