use rescue_core::geo::Coordinate;
use rescue_core::routing::{
    Destination, DistanceProvider, Leg, RouteOptimizer, RouteSource, MAX_DIRECT_STOPS,
};

fn coord(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat, lng).expect("valid coordinate")
}

fn dest(id: &str, lat: f64, lng: f64) -> Destination {
    Destination {
        id: Some(id.to_string()),
        location: coord(lat, lng),
    }
}

#[test]
fn empty_destination_set_yields_zero_totals_not_an_error() {
    let route = RouteOptimizer::new().optimize(coord(10.0, 10.0), &[]);
    assert!(route.stops.is_empty());
    assert_eq!(route.total_distance_km, 0.0);
    assert_eq!(route.total_duration_minutes, 0.0);
    assert!(!route.used_clustering);
}

#[test]
fn nearest_neighbor_order_matches_the_reference_scenario() {
    // Origin (0,0), A(0,1), B(0,2), C(0,0.5): expected visit order C, A, B.
    let destinations = vec![
        dest("A", 0.0, 1.0),
        dest("B", 0.0, 2.0),
        dest("C", 0.0, 0.5),
    ];
    let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);

    let order: Vec<&str> = route.stops[1..]
        .iter()
        .map(|s| s.destination_id.as_deref().expect("destination id"))
        .collect();
    assert_eq!(order, vec!["C", "A", "B"]);
}

#[test]
fn small_sets_visit_every_destination_exactly_once_without_clustering() {
    let destinations: Vec<Destination> = (0..MAX_DIRECT_STOPS)
        .map(|i| dest(&format!("d{i}"), 0.01 * i as f64, 0.02 * i as f64))
        .collect();
    let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);

    assert!(!route.used_clustering);
    let mut visited: Vec<String> = route.stops[1..]
        .iter()
        .filter_map(|s| s.destination_id.clone())
        .collect();
    visited.sort();
    let mut expected: Vec<String> = (0..MAX_DIRECT_STOPS).map(|i| format!("d{i}")).collect();
    expected.sort();
    assert_eq!(visited, expected);
}

#[test]
fn thirty_destinations_use_clustering_and_still_visit_all() {
    // Spread points ~11 km apart so each lands in its own 5 km cluster.
    let destinations: Vec<Destination> = (0..30)
        .map(|i| dest(&format!("d{i}"), 0.1 * i as f64, 0.0))
        .collect();
    let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);

    assert!(route.used_clustering);
    let mut visited: Vec<String> = route.stops[1..]
        .iter()
        .filter_map(|s| s.destination_id.clone())
        .collect();
    assert_eq!(visited.len(), 30, "each destination appears exactly once");
    visited.sort();
    visited.dedup();
    assert_eq!(visited.len(), 30);
    assert!(route.total_distance_km > 0.0);
    assert!(route.total_duration_minutes > 0.0);
}

#[test]
fn dense_oversized_sets_chain_cluster_tours() {
    // 40 points inside ~2 km: clustering caps groups at 25 and chains them.
    let destinations: Vec<Destination> = (0..40)
        .map(|i| dest(&format!("d{i}"), 0.0001 * i as f64, 0.0))
        .collect();
    let route = RouteOptimizer::new().optimize(coord(0.0, 0.0), &destinations);

    assert!(route.used_clustering);
    let visited: Vec<String> = route.stops[1..]
        .iter()
        .filter_map(|s| s.destination_id.clone())
        .collect();
    assert_eq!(visited.len(), 40);
}

struct DeadProvider;

impl DistanceProvider for DeadProvider {
    fn leg(&self, _from: Coordinate, _to: Coordinate) -> Option<Leg> {
        None
    }
}

#[test]
fn unavailable_provider_degrades_but_never_fails() {
    let destinations = vec![dest("A", 0.0, 0.5), dest("B", 0.0, 1.0)];
    let route = RouteOptimizer::new()
        .with_provider(Box::new(DeadProvider))
        .optimize(coord(0.0, 0.0), &destinations);

    assert_eq!(route.source, RouteSource::Estimated);
    assert_eq!(route.stops.len(), 3);
    assert!(route.total_distance_km > 0.0);
}

struct HalfDeadProvider;

impl DistanceProvider for HalfDeadProvider {
    fn leg(&self, from: Coordinate, _to: Coordinate) -> Option<Leg> {
        // Only answers legs leaving the origin.
        (from.lat() == 0.0 && from.lng() == 0.0).then_some(Leg {
            distance_km: 1.0,
            duration_minutes: 2.0,
        })
    }
}

#[test]
fn any_estimated_leg_marks_the_whole_route_estimated() {
    let destinations = vec![dest("A", 0.0, 0.5), dest("B", 0.0, 1.0)];
    let route = RouteOptimizer::new()
        .with_provider(Box::new(HalfDeadProvider))
        .optimize(coord(0.0, 0.0), &destinations);
    assert_eq!(route.source, RouteSource::Estimated);
}
