//! Great-circle distance and the in-memory geospatial index over case
//! locations.
//!
//! The index is partitioned by category and ordered by latitude. A radius
//! query scans only the latitude band that can contain matches, then applies
//! an exact haversine post-filter:
//!
//! 1. Convert the radius to a latitude delta (`radius / R`, in degrees)
//! 2. Range-scan the category's band `[lat - delta, lat + delta]`
//! 3. Keep points whose haversine distance is `<= radius`
//! 4. Sort by `(distance, case_id)` and truncate to the limit
//!
//! Only each case's current location is indexed; history is not.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::model::{CaseId, Category, Point};

/// Mean earth radius used for every distance in the engine.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Fixed-point scale for latitude keys (1e-7 degree, about 1 cm).
const LAT_KEY_SCALE: f64 = 1e7;

/// Haversine distance between two points in meters.
#[must_use]
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

#[allow(clippy::cast_possible_truncation)]
fn lat_key(lat: f64) -> i64 {
    (lat * LAT_KEY_SCALE).round() as i64
}

/// A case found by a radius query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub case_id: CaseId,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    point: Point,
    category: Category,
    lat_key: i64,
}

#[derive(Debug, Default)]
struct IndexInner {
    entries: HashMap<CaseId, IndexEntry>,
    bands: HashMap<Category, BTreeMap<i64, BTreeSet<CaseId>>>,
}

impl IndexInner {
    fn detach(&mut self, case_id: &CaseId) -> Option<IndexEntry> {
        let entry = self.entries.remove(case_id)?;
        if let Some(band) = self.bands.get_mut(&entry.category) {
            if let Some(ids) = band.get_mut(&entry.lat_key) {
                ids.remove(case_id);
                if ids.is_empty() {
                    band.remove(&entry.lat_key);
                }
            }
        }
        Some(entry)
    }

    fn attach(&mut self, case_id: &CaseId, point: Point, category: Category) {
        let entry = IndexEntry {
            point,
            category,
            lat_key: lat_key(point.lat),
        };
        self.bands
            .entry(category)
            .or_default()
            .entry(entry.lat_key)
            .or_default()
            .insert(case_id.clone());
        self.entries.insert(case_id.clone(), entry);
    }
}

/// Category-partitioned, latitude-ordered index of current case locations.
///
/// Readers and writers share an `RwLock`; every critical section is a short
/// in-memory update or scan, so a query never holds writers off for long.
#[derive(Debug, Default)]
pub struct GeoIndex {
    inner: RwLock<IndexInner>,
}

impl GeoIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move a case. A case is indexed under exactly one category
    /// and one point.
    pub fn upsert(&self, case_id: &CaseId, point: Point, category: Category) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.detach(case_id);
        inner.attach(case_id, point, category);

        tracing::debug!(%case_id, %category, %point, "geo index upsert");
    }

    /// Replace every entry with `locations` in a single swap. Readers see
    /// either the old index or the new one.
    pub fn rebuild<I>(&self, locations: I) -> usize
    where
        I: IntoIterator<Item = (CaseId, Point, Category)>,
    {
        let mut fresh = IndexInner::default();
        for (case_id, point, category) in locations {
            fresh.attach(&case_id, point, category);
        }
        let count = fresh.entries.len();
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        count
    }

    /// Remove a case. Returns `false` if it was not indexed.
    pub fn remove(&self, case_id: &CaseId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.detach(case_id).is_some();
        if removed {
            tracing::debug!(%case_id, "geo index remove");
        }
        removed
    }

    /// Cases of `category` within `radius_m` of `point` (inclusive), nearest
    /// first, at most `limit` of them.
    #[must_use]
    pub fn query(
        &self,
        point: Point,
        category: Category,
        radius_m: f64,
        limit: usize,
    ) -> Vec<Neighbor> {
        if limit == 0 || radius_m < 0.0 {
            return Vec::new();
        }

        let delta_deg = (radius_m / EARTH_RADIUS_METERS).to_degrees();
        let low = lat_key(point.lat - delta_deg) - 1;
        let high = lat_key(point.lat + delta_deg) + 1;

        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let Some(band) = inner.bands.get(&category) else {
            return Vec::new();
        };

        let mut hits: Vec<Neighbor> = band
            .range(low..=high)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|case_id| {
                let entry = inner.entries.get(case_id)?;
                let distance_m = point.distance_to(&entry.point);
                (distance_m <= radius_m).then(|| Neighbor {
                    case_id: case_id.clone(),
                    distance_m,
                })
            })
            .collect();
        drop(inner);

        hits.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.case_id.cmp(&b.case_id))
        });
        hits.truncate(limit);
        hits
    }

    /// Current indexed point of a case.
    #[must_use]
    pub fn position(&self, case_id: &CaseId) -> Option<Point> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(case_id).map(|entry| entry.point)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
