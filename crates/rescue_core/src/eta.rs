//! ETA estimation between a responder and a victim.
//!
//! Primary path asks the configured [`DistanceProvider`]; when it is absent or
//! fails, the estimate degrades to haversine distance at the 5 km/h
//! disaster-terrain speed with the duration rounded up to whole minutes.
//! Provider failure is never surfaced as an error — only malformed input
//! coordinates are (and those are unrepresentable once a [`Coordinate`] has
//! been constructed).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geo::{self, Coordinate};
use crate::routing::DistanceProvider;

/// Which path produced an ETA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaSource {
    Live,
    Fallback,
}

/// Distance, duration, and projected arrival time for one trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eta {
    pub distance_km: f64,
    pub duration_minutes: u64,
    pub estimated_arrival: DateTime<Utc>,
    pub source: EtaSource,
}

/// ETA estimator over an optional live directions provider.
#[derive(Default)]
pub struct EtaEstimator {
    provider: Option<Box<dyn DistanceProvider>>,
}

impl EtaEstimator {
    /// Fallback-only estimator.
    pub fn new() -> Self {
        Self { provider: None }
    }

    pub fn with_provider(mut self, provider: Box<dyn DistanceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Estimate arrival at `destination` leaving `origin` now.
    pub fn eta(&self, origin: Coordinate, destination: Coordinate) -> Eta {
        self.eta_at(origin, destination, Utc::now())
    }

    /// Estimate with an explicit departure time (deterministic for tests).
    pub fn eta_at(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        now: DateTime<Utc>,
    ) -> Eta {
        if let Some(provider) = &self.provider {
            if let Some(leg) = provider.leg(origin, destination) {
                let duration_minutes = leg.duration_minutes.ceil() as u64;
                return Eta {
                    distance_km: leg.distance_km,
                    duration_minutes,
                    estimated_arrival: now + Duration::minutes(duration_minutes as i64),
                    source: EtaSource::Live,
                };
            }
            warn!("directions provider unavailable, using fallback ETA");
        }

        let distance_km = geo::distance_km(origin, destination);
        let duration_minutes = geo::fallback_duration_minutes(distance_km);
        Eta {
            distance_km,
            duration_minutes,
            estimated_arrival: now + Duration::minutes(duration_minutes as i64),
            source: EtaSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Leg;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).expect("valid coordinate")
    }

    #[test]
    fn fallback_duration_matches_the_constant_speed_model() {
        let origin = coord(0.0, 0.0);
        let destination = coord(0.0, 0.1);
        let now = Utc::now();

        let eta = EtaEstimator::new().eta_at(origin, destination, now);
        assert_eq!(eta.source, EtaSource::Fallback);
        let expected = (eta.distance_km / 5.0 * 60.0).ceil() as u64;
        assert_eq!(eta.duration_minutes, expected);
        assert_eq!(
            eta.estimated_arrival,
            now + Duration::minutes(expected as i64)
        );
    }

    struct DeadProvider;

    impl DistanceProvider for DeadProvider {
        fn leg(&self, _from: Coordinate, _to: Coordinate) -> Option<Leg> {
            None
        }
    }

    #[test]
    fn provider_failure_degrades_instead_of_erroring() {
        let eta = EtaEstimator::new()
            .with_provider(Box::new(DeadProvider))
            .eta_at(coord(0.0, 0.0), coord(0.0, 0.5), Utc::now());
        assert_eq!(eta.source, EtaSource::Fallback);
        assert!(eta.distance_km > 0.0);
    }

    struct FixedProvider;

    impl DistanceProvider for FixedProvider {
        fn leg(&self, _from: Coordinate, _to: Coordinate) -> Option<Leg> {
            Some(Leg {
                distance_km: 12.5,
                duration_minutes: 30.2,
            })
        }
    }

    #[test]
    fn live_provider_values_pass_through() {
        let now = Utc::now();
        let eta = EtaEstimator::new()
            .with_provider(Box::new(FixedProvider))
            .eta_at(coord(0.0, 0.0), coord(0.0, 0.5), now);
        assert_eq!(eta.source, EtaSource::Live);
        assert_eq!(eta.distance_km, 12.5);
        assert_eq!(eta.duration_minutes, 31); // rounded up
        assert_eq!(eta.estimated_arrival, now + Duration::minutes(31));
    }

    #[test]
    fn zero_distance_arrives_immediately() {
        let now = Utc::now();
        let here = coord(10.0, 10.0);
        let eta = EtaEstimator::new().eta_at(here, here, now);
        assert_eq!(eta.distance_km, 0.0);
        assert_eq!(eta.duration_minutes, 0);
        assert_eq!(eta.estimated_arrival, now);
    }
}
