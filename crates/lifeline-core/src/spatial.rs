//! Great-circle geometry and a proximity index over geolocated points.
//!
//! Points are stored in the R-tree as unit-sphere vectors. Straight-line
//! (chord) distance between unit vectors is monotonic in great-circle
//! distance, so nearest-neighbour order in the tree is nearest-neighbour
//! order on the globe, and kilometre radii convert to chord radii exactly.

use std::collections::{BTreeMap, HashMap};

use rstar::primitives::GeomWithData;
use rstar::{PointDistance, RTree};

use crate::model::GeoPoint;

/// Mean Earth radius (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6_371.008_8;

type Entry = GeomWithData<[f64; 3], usize>;

/// Great-circle distance in kilometres (haversine formula).
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Weighted spherical centroid. Returns `None` for an empty or zero-weight
/// input, or when the weighted vectors cancel out (antipodal points).
pub fn spherical_centroid(points: impl IntoIterator<Item = (GeoPoint, f64)>) -> Option<GeoPoint> {
    let mut sum = [0.0_f64; 3];
    let mut total = 0.0;
    for (point, weight) in points {
        let v = to_unit(point);
        for (acc, c) in sum.iter_mut().zip(v) {
            *acc += c * weight;
        }
        total += weight;
    }
    if total <= 0.0 {
        return None;
    }
    let norm = sum.iter().map(|c| c * c).sum::<f64>().sqrt();
    if norm < 1e-12 {
        return None;
    }
    Some(from_unit([sum[0] / norm, sum[1] / norm, sum[2] / norm]))
}

fn to_unit(point: GeoPoint) -> [f64; 3] {
    let (lat, lon) = (point.lat.to_radians(), point.lon.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

fn from_unit(v: [f64; 3]) -> GeoPoint {
    let lat = v[2].clamp(-1.0, 1.0).asin().to_degrees();
    let lon = v[1].atan2(v[0]).to_degrees();
    GeoPoint::new(lat, lon)
}

fn chord_for_km(km: f64) -> f64 {
    let angle = (km / EARTH_RADIUS_KM).min(std::f64::consts::PI);
    2.0 * (angle / 2.0).sin()
}

fn km_for_chord(chord: f64) -> f64 {
    2.0 * EARTH_RADIUS_KM * (chord / 2.0).clamp(0.0, 1.0).asin()
}

/// Dynamic proximity index keyed by caller-chosen `usize` slots.
///
/// Each key appears at most once; re-inserting a key moves it.
#[derive(Default)]
pub struct SpatialIndex {
    tree: RTree<Entry>,
    positions: HashMap<usize, [f64; 3]>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.positions.len())
            .finish()
    }
}

impl SpatialIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load an index. Later duplicates of a key win.
    pub fn from_points(points: impl IntoIterator<Item = (usize, GeoPoint)>) -> Self {
        let mut ordered = BTreeMap::new();
        for (key, point) in points {
            ordered.insert(key, to_unit(point));
        }
        let entries = ordered
            .iter()
            .map(|(&key, &v)| GeomWithData::new(v, key))
            .collect();
        let positions = ordered.into_iter().collect();
        Self {
            tree: RTree::bulk_load(entries),
            positions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn insert(&mut self, key: usize, point: GeoPoint) {
        self.remove(key);
        let v = to_unit(point);
        self.tree.insert(GeomWithData::new(v, key));
        self.positions.insert(key, v);
    }

    /// Remove `key`; returns whether it was present.
    pub fn remove(&mut self, key: usize) -> bool {
        let Some(v) = self.positions.remove(&key) else {
            return false;
        };
        self.tree.remove(&GeomWithData::new(v, key)).is_some()
    }

    /// Nearest key to `point` and its great-circle distance in km.
    ///
    /// Equidistant candidates resolve to the smallest key.
    #[must_use]
    pub fn nearest(&self, point: GeoPoint) -> Option<(usize, f64)> {
        self.nearest_where(point, |_| true)
    }

    /// Nearest key other than `exclude`.
    #[must_use]
    pub fn nearest_excluding(&self, point: GeoPoint, exclude: usize) -> Option<(usize, f64)> {
        self.nearest_where(point, |key| key != exclude)
    }

    fn nearest_where(&self, point: GeoPoint, keep: impl Fn(usize) -> bool) -> Option<(usize, f64)> {
        let query = to_unit(point);
        let mut best: Option<(usize, f64)> = None;
        for entry in self.tree.nearest_neighbor_iter(&query) {
            if !keep(entry.data) {
                continue;
            }
            let d2 = entry.distance_2(&query);
            match best {
                None => best = Some((entry.data, d2)),
                Some((key, best_d2)) if d2 <= best_d2 => {
                    if entry.data < key {
                        best = Some((entry.data, d2));
                    }
                }
                Some(_) => break,
            }
        }
        best.map(|(key, d2)| (key, km_for_chord(d2.sqrt())))
    }

    /// All keys within `radius_km`, nearest first (ties by key).
    #[must_use]
    pub fn within_km(&self, point: GeoPoint, radius_km: f64) -> Vec<(usize, f64)> {
        let query = to_unit(point);
        let chord = chord_for_km(radius_km.max(0.0));
        let mut hits: Vec<(usize, f64)> = self
            .tree
            .locate_within_distance(query, chord * chord)
            .map(|entry| (entry.data, km_for_chord(entry.distance_2(&query).sqrt())))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONDON: GeoPoint = GeoPoint::new(51.5074, -0.1278);
    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);
    const BERLIN: GeoPoint = GeoPoint::new(52.52, 13.405);
    const SYDNEY: GeoPoint = GeoPoint::new(-33.8688, 151.2093);

    #[test]
    fn haversine_matches_known_distance() {
        let d = haversine_km(LONDON, PARIS);
        assert!((d - 343.5).abs() < 2.0, "london-paris = {d}");
        assert!(haversine_km(LONDON, LONDON) < 1e-9);
    }

    #[test]
    fn chord_conversion_round_trips() {
        for km in [0.0, 1.0, 350.0, 5_000.0, 19_000.0] {
            let back = km_for_chord(chord_for_km(km));
            assert!((back - km).abs() < 1e-6, "{km} -> {back}");
        }
    }

    #[test]
    fn nearest_and_exclusion() {
        let index = SpatialIndex::from_points([(0, LONDON), (1, PARIS), (2, SYDNEY)]);
        let (key, km) = index.nearest(GeoPoint::new(51.0, 0.0)).expect("non-empty");
        assert_eq!(key, 0);
        assert!(km < 100.0);

        let (other, km) = index.nearest_excluding(LONDON, 0).expect("has others");
        assert_eq!(other, 1);
        assert!((km - haversine_km(LONDON, PARIS)).abs() < 1e-6);
    }

    #[test]
    fn within_radius_sorted_by_distance() {
        let index = SpatialIndex::from_points([(0, LONDON), (1, PARIS), (2, BERLIN), (3, SYDNEY)]);
        let hits = index.within_km(LONDON, 1_000.0);
        let keys: Vec<usize> = hits.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 1, 2]);
    }

    #[test]
    fn insert_remove_and_move() {
        let mut index = SpatialIndex::new();
        assert!(index.nearest(LONDON).is_none());
        index.insert(7, LONDON);
        index.insert(8, PARIS);
        assert_eq!(index.len(), 2);

        index.insert(7, SYDNEY);
        assert_eq!(index.len(), 2);
        assert_eq!(index.nearest(LONDON).map(|(k, _)| k), Some(8));

        assert!(index.remove(8));
        assert!(!index.remove(8));
        assert_eq!(index.nearest(LONDON).map(|(k, _)| k), Some(7));
    }

    #[test]
    fn centroid_of_symmetric_points_sits_between_them() {
        let c = spherical_centroid([
            (GeoPoint::new(0.0, -10.0), 1.0),
            (GeoPoint::new(0.0, 10.0), 1.0),
        ])
        .expect("centroid");
        assert!(c.lat.abs() < 1e-9);
        assert!(c.lon.abs() < 1e-9);
        assert!(spherical_centroid(std::iter::empty()).is_none());
    }
}
