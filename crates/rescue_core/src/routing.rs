//! Pluggable distance providers and multi-stop rescue route optimization.
//!
//! Distances come from a [`DistanceProvider`] trait object so the optimizer
//! can run against:
//!
//! - a live directions endpoint (feature `live-providers`), or
//! - pure local geometry (haversine + the 5 km/h disaster-terrain model).
//!
//! The optimizer never fails outright: any leg the provider cannot answer is
//! estimated locally and the result's `source` flips to `Estimated` so callers
//! can tell live-data routes from degraded ones.
//!
//! Tour construction is a nearest-neighbor heuristic (greedy, O(n²), not an
//! optimal TSP solution). Sets larger than [`MAX_DIRECT_STOPS`] are first
//! partitioned with the greedy proximity clustering and the per-cluster tours
//! are chained end to end.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cluster::{cluster_by_proximity, ClusterParams};
use crate::geo::{self, Coordinate};

/// Above this many destinations, cluster before solving.
pub const MAX_DIRECT_STOPS: usize = 25;

/// Clustering radius used when partitioning oversized destination sets.
const ROUTE_CLUSTER_RADIUS_KM: f64 = 5.0;

// ---------------------------------------------------------------------------
// Distance providers
// ---------------------------------------------------------------------------

/// One hop between two coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

/// Trait for directions/distance backends. Implementations must be
/// `Send + Sync` so a provider can be shared across engine operations.
///
/// Returning `None` means the backend could not answer (unreachable, rate
/// limited, no route); callers fall back to local geometry.
pub trait DistanceProvider: Send + Sync {
    fn leg(&self, from: Coordinate, to: Coordinate) -> Option<Leg>;
}

impl<P: DistanceProvider + ?Sized> DistanceProvider for std::sync::Arc<P> {
    fn leg(&self, from: Coordinate, to: Coordinate) -> Option<Leg> {
        (**self).leg(from, to)
    }
}

/// Local-geometry leg estimate: haversine distance at the disaster-area speed.
pub fn estimated_leg(from: Coordinate, to: Coordinate) -> Leg {
    let distance_km = geo::distance_km(from, to);
    Leg {
        distance_km,
        duration_minutes: geo::travel_minutes(distance_km),
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Cache key: coordinates quantized to microdegrees (directional pair).
fn quantize(c: Coordinate) -> (i64, i64) {
    (
        (c.lat() * 1e6).round() as i64,
        (c.lng() * 1e6).round() as i64,
    )
}

/// LRU-cached wrapper around any [`DistanceProvider`].
///
/// Only successful lookups are cached; failures are retried on the next call.
pub struct CachedDistanceProvider {
    inner: Box<dyn DistanceProvider>,
    cache: Mutex<LruCache<((i64, i64), (i64, i64)), Leg>>,
}

impl CachedDistanceProvider {
    pub fn new(inner: Box<dyn DistanceProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("cache capacity must be > 0"),
            )),
        }
    }
}

impl DistanceProvider for CachedDistanceProvider {
    fn leg(&self, from: Coordinate, to: Coordinate) -> Option<Leg> {
        let key = (quantize(from), quantize(to));

        {
            let mut cache = self.cache.lock().ok()?;
            if let Some(cached) = cache.get(&key) {
                return Some(*cached);
            }
        }

        let result = self.inner.leg(from, to);

        if let Some(leg) = result {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(key, leg);
            }
        }

        result
    }
}

// ---------------------------------------------------------------------------
// Live provider (behind `live-providers` feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "live-providers")]
pub mod osrm {
    use super::*;
    use reqwest::blocking::Client;
    use std::time::Duration;

    /// Default timeout for a single directions lookup.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Directions via an OSRM-compatible HTTP endpoint.
    pub struct OsrmDistanceProvider {
        client: Client,
        endpoint: String,
    }

    impl OsrmDistanceProvider {
        /// Build a provider for the given endpoint. Falls back to `None` legs
        /// (and therefore local estimates) if the client cannot be built.
        pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
            let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
            Ok(Self {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
            })
        }
    }

    /// Minimal OSRM JSON response structures.
    #[derive(Deserialize)]
    struct OsrmResponse {
        code: String,
        routes: Option<Vec<OsrmRoute>>,
    }

    #[derive(Deserialize)]
    struct OsrmRoute {
        distance: f64, // metres
        duration: f64, // seconds
    }

    impl DistanceProvider for OsrmDistanceProvider {
        fn leg(&self, from: Coordinate, to: Coordinate) -> Option<Leg> {
            let url = format!(
                "{}/route/v1/driving/{},{};{},{}?overview=false",
                self.endpoint,
                from.lng(),
                from.lat(),
                to.lng(),
                to.lat(),
            );

            let resp: OsrmResponse = match self.client.get(&url).send() {
                Ok(r) => match r.json() {
                    Ok(j) => j,
                    Err(_) => return None,
                },
                Err(_) => return None,
            };

            if resp.code != "Ok" {
                return None;
            }

            let route = resp.routes?.into_iter().next()?;
            Some(Leg {
                distance_km: route.distance / 1000.0,
                duration_minutes: route.duration / 60.0,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Route optimization
// ---------------------------------------------------------------------------

/// A stop to visit, optionally tied back to a caller-side record (request id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub id: Option<String>,
    pub location: Coordinate,
}

impl Destination {
    pub fn at(location: Coordinate) -> Self {
        Self { id: None, location }
    }
}

/// Where the route's distances came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Every hop was answered by the live directions provider.
    Live,
    /// At least one hop (or all of them) used local geometry.
    Estimated,
}

/// One entry in the ordered stop sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub sequence: usize,
    pub location: Coordinate,
    /// `None` for the origin (and the closing origin stop on round trips).
    pub destination_id: Option<String>,
    /// Distance from the previous stop; 0 for the origin.
    pub leg_distance_km: f64,
    pub leg_duration_minutes: f64,
}

/// An optimized multi-stop route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    /// Origin first, then destinations in visit order, origin again last when
    /// the optimizer was configured for round trips.
    pub stops: Vec<RouteStop>,
    pub total_distance_km: f64,
    pub total_duration_minutes: f64,
    pub used_clustering: bool,
    pub source: RouteSource,
}

impl RouteResult {
    fn empty() -> Self {
        Self {
            stops: Vec::new(),
            total_distance_km: 0.0,
            total_duration_minutes: 0.0,
            used_clustering: false,
            source: RouteSource::Estimated,
        }
    }
}

/// Nearest-neighbor route optimizer over an injected distance provider.
pub struct RouteOptimizer {
    provider: Option<Box<dyn DistanceProvider>>,
    round_trip: bool,
}

impl Default for RouteOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteOptimizer {
    /// Local-geometry-only optimizer.
    pub fn new() -> Self {
        Self {
            provider: None,
            round_trip: false,
        }
    }

    /// Use a live directions provider for leg costing, with per-leg local
    /// fallback.
    pub fn with_provider(mut self, provider: Box<dyn DistanceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Close the tour by returning to the origin.
    pub fn with_round_trip(mut self, round_trip: bool) -> Self {
        self.round_trip = round_trip;
        self
    }

    /// Build an optimized route from `origin` through all `destinations`.
    ///
    /// An empty destination set is a valid input and yields an empty route
    /// with zero totals, not an error.
    pub fn optimize(&self, origin: Coordinate, destinations: &[Destination]) -> RouteResult {
        if destinations.is_empty() {
            return RouteResult::empty();
        }

        let (order, used_clustering) = if destinations.len() > MAX_DIRECT_STOPS {
            (self.clustered_order(origin, destinations), true)
        } else {
            (
                nearest_neighbor_order(origin, destinations, &index_range(destinations.len())),
                false,
            )
        };

        self.build_route(origin, destinations, &order, used_clustering)
    }

    /// Partition oversized destination sets, then chain per-cluster tours:
    /// each cluster's tour starts where the previous one ended.
    fn clustered_order(&self, origin: Coordinate, destinations: &[Destination]) -> Vec<usize> {
        let params = ClusterParams::default()
            .with_radius_km(ROUTE_CLUSTER_RADIUS_KM)
            .with_max_cluster_size(Some(MAX_DIRECT_STOPS));
        let clusters = cluster_by_proximity(destinations, |d| d.location, params);

        let mut order = Vec::with_capacity(destinations.len());
        let mut current = origin;
        for cluster in clusters {
            let leg_order = nearest_neighbor_order(current, destinations, &cluster);
            if let Some(&last) = leg_order.last() {
                current = destinations[last].location;
            }
            order.extend(leg_order);
        }
        order
    }

    /// Resolve one leg through the provider, falling back to local geometry.
    /// The bool is true when the live provider answered.
    fn resolve_leg(&self, from: Coordinate, to: Coordinate) -> (Leg, bool) {
        if let Some(provider) = &self.provider {
            match provider.leg(from, to) {
                Some(leg) => return (leg, true),
                None => {
                    warn!(
                        from_lat = from.lat(),
                        from_lng = from.lng(),
                        to_lat = to.lat(),
                        to_lng = to.lng(),
                        "directions provider unavailable for leg, using local estimate"
                    );
                }
            }
        }
        (estimated_leg(from, to), false)
    }

    fn build_route(
        &self,
        origin: Coordinate,
        destinations: &[Destination],
        order: &[usize],
        used_clustering: bool,
    ) -> RouteResult {
        let mut stops = Vec::with_capacity(order.len() + 2);
        stops.push(RouteStop {
            sequence: 0,
            location: origin,
            destination_id: None,
            leg_distance_km: 0.0,
            leg_duration_minutes: 0.0,
        });

        let mut total_distance = 0.0;
        let mut total_duration = 0.0;
        let mut all_live = self.provider.is_some();
        let mut current = origin;

        for (seq, &idx) in order.iter().enumerate() {
            let dest = &destinations[idx];
            let (leg, live) = self.resolve_leg(current, dest.location);
            all_live &= live;
            total_distance += leg.distance_km;
            total_duration += leg.duration_minutes;
            stops.push(RouteStop {
                sequence: seq + 1,
                location: dest.location,
                destination_id: dest.id.clone(),
                leg_distance_km: leg.distance_km,
                leg_duration_minutes: leg.duration_minutes,
            });
            current = dest.location;
        }

        if self.round_trip {
            let (leg, live) = self.resolve_leg(current, origin);
            all_live &= live;
            total_distance += leg.distance_km;
            total_duration += leg.duration_minutes;
            stops.push(RouteStop {
                sequence: stops.len(),
                location: origin,
                destination_id: None,
                leg_distance_km: leg.distance_km,
                leg_duration_minutes: leg.duration_minutes,
            });
        }

        RouteResult {
            stops,
            total_distance_km: total_distance,
            total_duration_minutes: total_duration,
            used_clustering,
            source: if all_live {
                RouteSource::Live
            } else {
                RouteSource::Estimated
            },
        }
    }
}

fn index_range(len: usize) -> Vec<usize> {
    (0..len).collect()
}

/// Greedy nearest-neighbor ordering of `candidates` (indices into
/// `destinations`) starting from `start`. Ties break toward the earlier input
/// index: the first candidate at the minimum distance wins.
fn nearest_neighbor_order(
    start: Coordinate,
    destinations: &[Destination],
    candidates: &[usize],
) -> Vec<usize> {
    let mut remaining: Vec<usize> = candidates.to_vec();
    let mut order = Vec::with_capacity(remaining.len());
    let mut current = start;

    while !remaining.is_empty() {
        let mut nearest_pos = 0;
        let mut nearest_distance = f64::INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let d = geo::distance_km(current, destinations[idx].location);
            if d < nearest_distance {
                nearest_distance = d;
                nearest_pos = pos;
            }
        }
        let next = remaining.remove(nearest_pos);
        current = destinations[next].location;
        order.push(next);
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).expect("valid coordinate")
    }

    fn dest(lat: f64, lng: f64) -> Destination {
        Destination::at(coord(lat, lng))
    }

    #[test]
    fn empty_destination_set_is_an_empty_route() {
        let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &[]);
        assert!(route.stops.is_empty());
        assert_eq!(route.total_distance_km, 0.0);
        assert_eq!(route.total_duration_minutes, 0.0);
        assert!(!route.used_clustering);
    }

    #[test]
    fn nearest_neighbor_visits_closest_first() {
        // Origin (0,0); A(0,1), B(0,2), C(0,0.5) -> C, A, B.
        let destinations = vec![dest(0.0, 1.0), dest(0.0, 2.0), dest(0.0, 0.5)];
        let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);

        let visited: Vec<(f64, f64)> = route.stops[1..]
            .iter()
            .map(|s| (s.location.lat(), s.location.lng()))
            .collect();
        assert_eq!(visited, vec![(0.0, 0.5), (0.0, 1.0), (0.0, 2.0)]);
        assert_eq!(route.source, RouteSource::Estimated);
    }

    #[test]
    fn ties_break_toward_input_order() {
        // Two destinations equidistant from origin: the first one wins.
        let destinations = vec![dest(0.0, 1.0), dest(0.0, -1.0)];
        let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);
        assert_eq!(route.stops[1].location.lng(), 1.0);
    }

    #[test]
    fn every_destination_visited_exactly_once() {
        let destinations: Vec<Destination> =
            (0..20).map(|i| dest(0.1 * i as f64, 0.2 * i as f64)).collect();
        let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);
        assert_eq!(route.stops.len(), destinations.len() + 1);
        assert!(!route.used_clustering);

        let mut lats: Vec<i64> = route.stops[1..]
            .iter()
            .map(|s| (s.location.lat() * 1e6) as i64)
            .collect();
        lats.sort_unstable();
        lats.dedup();
        assert_eq!(lats.len(), destinations.len());
    }

    #[test]
    fn round_trip_closes_at_the_origin() {
        let destinations = vec![dest(0.0, 1.0)];
        let route = RouteOptimizer::new()
            .with_round_trip(true)
            .optimize(coord(0.0, 0.0), &destinations);
        assert_eq!(route.stops.len(), 3);
        let last = route.stops.last().expect("closing stop");
        assert_eq!((last.location.lat(), last.location.lng()), (0.0, 0.0));
        assert!(last.leg_distance_km > 0.0);
    }

    #[test]
    fn totals_match_the_sum_of_legs() {
        let destinations = vec![dest(0.0, 0.5), dest(0.0, 1.0)];
        let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);
        let leg_sum: f64 = route.stops.iter().map(|s| s.leg_distance_km).sum();
        assert!((route.total_distance_km - leg_sum).abs() < 1e-9);
        // Two hops of ~55.6 km each: bounded well under 200 km.
        assert!(route.total_distance_km > 100.0 && route.total_distance_km < 200.0);
    }

    struct FlakyProvider;

    impl DistanceProvider for FlakyProvider {
        fn leg(&self, _from: Coordinate, _to: Coordinate) -> Option<Leg> {
            None
        }
    }

    #[test]
    fn provider_failure_degrades_to_estimate() {
        let destinations = vec![dest(0.0, 1.0)];
        let route = RouteOptimizer::new()
            .with_provider(Box::new(FlakyProvider))
            .optimize(coord(0.0, 0.0), &destinations);
        assert_eq!(route.source, RouteSource::Estimated);
        assert!(route.total_distance_km > 0.0);
    }

    struct FixedProvider(Leg);

    impl DistanceProvider for FixedProvider {
        fn leg(&self, _from: Coordinate, _to: Coordinate) -> Option<Leg> {
            Some(self.0)
        }
    }

    #[test]
    fn live_provider_marks_route_live() {
        let destinations = vec![dest(0.0, 1.0), dest(0.0, 2.0)];
        let route = RouteOptimizer::new()
            .with_provider(Box::new(FixedProvider(Leg {
                distance_km: 10.0,
                duration_minutes: 15.0,
            })))
            .optimize(coord(0.0, 0.0), &destinations);
        assert_eq!(route.source, RouteSource::Live);
        assert_eq!(route.total_distance_km, 20.0);
        assert_eq!(route.total_duration_minutes, 30.0);
    }

    #[test]
    fn cached_provider_serves_repeat_lookups() {
        let inner = Box::new(FixedProvider(Leg {
            distance_km: 3.0,
            duration_minutes: 4.0,
        }));
        let cached = CachedDistanceProvider::new(inner, 16);
        let a = coord(0.0, 0.0);
        let b = coord(0.0, 1.0);
        let first = cached.leg(a, b).expect("leg");
        let second = cached.leg(a, b).expect("cached leg");
        assert_eq!(first, second);
    }
}
