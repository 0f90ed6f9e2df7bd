//! Spatial index: H3-based geographic lookups for nearby queries.
//!
//! Maintains H3 cell → record-id mappings for requests and responders so
//! "who is near this point" queries prefilter by grid disk instead of
//! scanning every record. Resolution 9 (~240 m cells), as in city-scale use.
//! The prefilter is coarse on purpose; callers apply an exact haversine
//! filter to the surviving candidates.

use std::collections::HashMap;

use h3o::{CellIndex, LatLng, Resolution};

use crate::geo::Coordinate;

/// Index resolution. ~240 m cells.
const INDEX_RESOLUTION: Resolution = Resolution::Nine;

/// Approximate center-to-center spacing of neighboring cells at
/// [`INDEX_RESOLUTION`], used to convert a km radius into a grid-disk k.
const APPROX_CELL_SPACING_KM: f64 = 0.3;

/// Snap a coordinate to its index cell.
pub fn cell_for(coord: Coordinate) -> CellIndex {
    // Coordinate construction already guarantees valid lat/lng ranges.
    LatLng::new(coord.lat(), coord.lng())
        .expect("validated coordinate is a valid LatLng")
        .to_cell(INDEX_RESOLUTION)
}

/// Grid-disk radius (in rings) covering `radius_km` around a cell.
fn disk_k(radius_km: f64) -> u32 {
    (radius_km / APPROX_CELL_SPACING_KM).ceil().max(1.0) as u32
}

/// H3 cell → record-id index for requests and responders.
///
/// Updated incrementally as requests are created/closed and responder pings
/// arrive; queries return candidate ids only (coarse, superset of the exact
/// radius).
#[derive(Debug, Default)]
pub struct SpatialIndex {
    requests_by_cell: HashMap<CellIndex, Vec<String>>,
    request_to_cell: HashMap<String, CellIndex>,
    responders_by_cell: HashMap<CellIndex, Vec<String>>,
    responder_to_cell: HashMap<String, CellIndex>,
}

fn insert(
    by_cell: &mut HashMap<CellIndex, Vec<String>>,
    to_cell: &mut HashMap<String, CellIndex>,
    id: &str,
    cell: CellIndex,
) {
    by_cell.entry(cell).or_default().push(id.to_string());
    to_cell.insert(id.to_string(), cell);
}

fn remove(
    by_cell: &mut HashMap<CellIndex, Vec<String>>,
    to_cell: &mut HashMap<String, CellIndex>,
    id: &str,
) {
    if let Some(cell) = to_cell.remove(id) {
        if let Some(ids) = by_cell.get_mut(&cell) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                by_cell.remove(&cell);
            }
        }
    }
}

fn ids_in_disk(
    by_cell: &HashMap<CellIndex, Vec<String>>,
    center: Coordinate,
    radius_km: f64,
) -> Vec<String> {
    let origin = cell_for(center);
    let mut result = Vec::new();
    for cell in origin.grid_disk::<Vec<_>>(disk_k(radius_km)) {
        if let Some(ids) = by_cell.get(&cell) {
            result.extend(ids.iter().cloned());
        }
    }
    result
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_request(&mut self, id: &str, location: Coordinate) {
        remove(&mut self.requests_by_cell, &mut self.request_to_cell, id);
        insert(
            &mut self.requests_by_cell,
            &mut self.request_to_cell,
            id,
            cell_for(location),
        );
    }

    pub fn remove_request(&mut self, id: &str) {
        remove(&mut self.requests_by_cell, &mut self.request_to_cell, id);
    }

    /// Insert or move a responder to a new position.
    pub fn upsert_responder(&mut self, id: &str, location: Coordinate) {
        remove(&mut self.responders_by_cell, &mut self.responder_to_cell, id);
        insert(
            &mut self.responders_by_cell,
            &mut self.responder_to_cell,
            id,
            cell_for(location),
        );
    }

    pub fn remove_responder(&mut self, id: &str) {
        remove(&mut self.responders_by_cell, &mut self.responder_to_cell, id);
    }

    /// Candidate request ids within roughly `radius_km` of `center`.
    pub fn request_candidates(&self, center: Coordinate, radius_km: f64) -> Vec<String> {
        ids_in_disk(&self.requests_by_cell, center, radius_km)
    }

    /// Candidate responder ids within roughly `radius_km` of `center`.
    pub fn responder_candidates(&self, center: Coordinate, radius_km: f64) -> Vec<String> {
        ids_in_disk(&self.responders_by_cell, center, radius_km)
    }

    pub fn clear(&mut self) {
        self.requests_by_cell.clear();
        self.request_to_cell.clear();
        self.responders_by_cell.clear();
        self.responder_to_cell.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).expect("valid coordinate")
    }

    #[test]
    fn nearby_request_is_a_candidate() {
        let mut index = SpatialIndex::new();
        let center = coord(37.7749, -122.4194);
        index.insert_request("r1", center);
        index.insert_request("r2", coord(37.7755, -122.4190)); // ~80 m away
        index.insert_request("far", coord(38.5, -121.5)); // ~100 km away

        let candidates = index.request_candidates(center, 2.0);
        assert!(candidates.contains(&"r1".to_string()));
        assert!(candidates.contains(&"r2".to_string()));
        assert!(!candidates.contains(&"far".to_string()));
    }

    #[test]
    fn responder_moves_leave_one_entry() {
        let mut index = SpatialIndex::new();
        let start = coord(37.77, -122.41);
        let moved = coord(37.80, -122.27); // Oakland, well outside 2 km
        index.upsert_responder("v1", start);
        index.upsert_responder("v1", moved);

        assert!(index.responder_candidates(start, 2.0).is_empty());
        let near_new = index.responder_candidates(moved, 2.0);
        assert_eq!(near_new, vec!["v1".to_string()]);
    }

    #[test]
    fn removal_empties_the_index() {
        let mut index = SpatialIndex::new();
        let here = coord(10.0, 10.0);
        index.insert_request("r1", here);
        index.remove_request("r1");
        assert!(index.request_candidates(here, 5.0).is_empty());
    }
}
