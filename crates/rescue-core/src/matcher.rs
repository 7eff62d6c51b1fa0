//! Proximity matching for incoming sightings.
//!
//! Matching is purely categorical and geometric: same normalized category,
//! within the configured radius, nearest first. An empty result means the
//! caller should open a new case.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::MatchingConfig;
use crate::error::EngineError;
use crate::geo::GeoIndex;
use crate::model::{Case, CaseId, Category, Point, Status, normalize_category};
use crate::store::CaseStore;

/// A nearby case offered to the reporter for disambiguation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub case_id: CaseId,
    /// Great-circle distance from the submitted point, in meters.
    pub distance_m: f64,
    pub category: Category,
    pub status: Status,
    pub location: Point,
    /// Description texts, oldest first; the last one is current.
    pub descriptions: Vec<String>,
    pub photos: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    fn project(case: &Case, distance_m: f64) -> Self {
        Self {
            case_id: case.id.clone(),
            distance_m,
            category: case.category,
            status: case.status,
            location: case.location,
            descriptions: case.descriptions.iter().map(|d| d.text.clone()).collect(),
            photos: case.photos.iter().map(|p| p.url.clone()).collect(),
            updated_at: case.updated_at,
        }
    }
}

pub struct ProximityMatcher<'a> {
    index: &'a GeoIndex,
    store: &'a dyn CaseStore,
    config: &'a MatchingConfig,
}

impl<'a> ProximityMatcher<'a> {
    #[must_use]
    pub fn new(index: &'a GeoIndex, store: &'a dyn CaseStore, config: &'a MatchingConfig) -> Self {
        Self {
            index,
            store,
            config,
        }
    }

    /// Nearby cases of the same category, nearest first, at most
    /// `max_candidates`.
    ///
    /// Performs no writes. A category outside the fixed vocabulary matches
    /// nothing.
    ///
    /// # Errors
    ///
    /// Validation errors for a blank category or bad coordinates; storage
    /// errors while loading candidate records.
    pub fn find_candidates(
        &self,
        category: &str,
        point: Point,
    ) -> Result<Vec<Candidate>, EngineError> {
        let normalized = normalize_category(category);
        if normalized.is_empty() {
            return Err(EngineError::validation("category", "category is required"));
        }
        point.validate()?;

        let Ok(category) = normalized.parse::<Category>() else {
            debug!(category = %normalized, "no cases can match an unknown category");
            return Ok(Vec::new());
        };

        let neighbors = self.index.query(
            point,
            category,
            self.config.radius_meters,
            self.config.max_candidates,
        );

        let mut candidates = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            match self.store.get(&neighbor.case_id)? {
                Some(case) => candidates.push(Candidate::project(&case, neighbor.distance_m)),
                None => debug!(case_id = %neighbor.case_id, "indexed case vanished before load"),
            }
        }

        debug!(%category, %point, found = candidates.len(), "proximity match");
        Ok(candidates)
    }
}
