//! Greedy proximity clustering.
//!
//! Single pass over the input: each unassigned point seeds a new cluster,
//! then absorbs remaining unassigned points within `radius_km` of the *seed*
//! (not of the cluster as a whole) until the optional size cap is hit.
//!
//! This is seed-order-dependent and seed-distance-only — not an optimal
//! clustering. It is kept that way on purpose: callers rely on the
//! deterministic, input-order-preserving behaviour, so do not replace it with
//! a mutual-proximity algorithm.

use crate::geo::{self, Coordinate};

/// Parameters for [`cluster_by_proximity`].
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Absorption radius around each cluster seed, in kilometres.
    pub radius_km: f64,
    /// Maximum members per cluster; `None` = unbounded grouping.
    pub max_cluster_size: Option<usize>,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            radius_km: 2.0,
            max_cluster_size: Some(10),
        }
    }
}

impl ClusterParams {
    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn with_max_cluster_size(mut self, max: Option<usize>) -> Self {
        self.max_cluster_size = max;
        self
    }
}

/// Group items by proximity to greedy seeds. Returns groups of indices into
/// `items`, in seed order; within a group, indices are in input order with the
/// seed first. Every index appears in exactly one group.
pub fn cluster_by_proximity<T, F>(items: &[T], coord_of: F, params: ClusterParams) -> Vec<Vec<usize>>
where
    F: Fn(&T) -> Coordinate,
{
    let cap = params.max_cluster_size.unwrap_or(usize::MAX).max(1);
    let mut used = vec![false; items.len()];
    let mut clusters = Vec::new();

    for seed in 0..items.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let seed_coord = coord_of(&items[seed]);
        let mut cluster = vec![seed];

        for candidate in seed + 1..items.len() {
            if cluster.len() >= cap {
                break;
            }
            if used[candidate] {
                continue;
            }
            if geo::distance_km(seed_coord, coord_of(&items[candidate])) <= params.radius_km {
                used[candidate] = true;
                cluster.push(candidate);
            }
        }

        clusters.push(cluster);
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).expect("valid coordinate")
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let clusters = cluster_by_proximity(&[], |c: &Coordinate| *c, ClusterParams::default());
        assert!(clusters.is_empty());
    }

    #[test]
    fn nearby_points_share_a_cluster() {
        // ~1.1 km apart at the equator; third point far away.
        let points = [coord(0.0, 0.0), coord(0.0, 0.01), coord(0.0, 1.0)];
        let clusters = cluster_by_proximity(&points, |c| *c, ClusterParams::default());
        assert_eq!(clusters, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn size_cap_splits_dense_groups() {
        // Five co-located points, cap 2: expect clusters of 2, 2, 1.
        let points = vec![coord(0.0, 0.0); 5];
        let params = ClusterParams::default().with_max_cluster_size(Some(2));
        let clusters = cluster_by_proximity(&points, |c| *c, params);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0], vec![0, 1]);
        assert_eq!(clusters[1], vec![2, 3]);
        assert_eq!(clusters[2], vec![4]);
    }

    #[test]
    fn membership_is_measured_from_the_seed_only() {
        // a-b within radius, b-c within radius, a-c not: c must NOT join a's
        // cluster even though it is near member b.
        let a = coord(0.0, 0.0);
        let b = coord(0.0, 0.016); // ~1.8 km from a
        let c = coord(0.0, 0.032); // ~3.6 km from a, ~1.8 km from b
        let params = ClusterParams::default().with_radius_km(2.0).with_max_cluster_size(None);
        let clusters = cluster_by_proximity(&[a, b, c], |p| *p, params);
        assert_eq!(clusters, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn deterministic_given_stable_input_order() {
        let points = [
            coord(0.0, 0.0),
            coord(0.0, 0.01),
            coord(0.0, 0.5),
            coord(0.0, 0.51),
        ];
        let params = ClusterParams::default();
        let first = cluster_by_proximity(&points, |c| *c, params);
        let second = cluster_by_proximity(&points, |c| *c, params);
        assert_eq!(first, second);
        assert_eq!(first, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn every_index_lands_in_exactly_one_cluster() {
        let points: Vec<Coordinate> = (0..40).map(|i| coord(0.0, i as f64 * 0.05)).collect();
        let params = ClusterParams::default().with_radius_km(5.0).with_max_cluster_size(Some(3));
        let clusters = cluster_by_proximity(&points, |c| *c, params);
        let mut seen: Vec<usize> = clusters.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());
    }
}
