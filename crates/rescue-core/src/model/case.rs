use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use crate::error::EngineError;
use crate::geo;

/// Opaque unique case identifier (`case-<hex>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    const PREFIX: &'static str = "case-";

    /// Mint a fresh id from the creating contributor and the creation instant.
    #[must_use]
    pub fn generate(contributor: &ContributorId, at: DateTime<Utc>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(contributor.as_str().as_bytes());
        hasher.update(&at.timestamp_micros().to_le_bytes());
        hasher.update(&rand::random::<u64>().to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(format!("{}{}", Self::PREFIX, &hex[..12]))
    }

    /// Wrap an id without checking its shape (ids read back from storage or
    /// typed by an operator).
    #[must_use]
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a reporter or administrator, issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContributorId(String);

impl ContributorId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A WGS84 position. Longitude first, matching `GeoJSON` coordinate order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lng: f64,
    pub lat: f64,
}

impl Point {
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Reject non-finite or out-of-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending coordinate.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(EngineError::validation(
                "location.lat",
                format!("{} is not within [-90, 90]", self.lat),
            ));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(EngineError::validation(
                "location.lng",
                format!("{} is not within [-180, 180]", self.lng),
            ));
        }
        Ok(())
    }

    /// Great-circle distance in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        geo::haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Animal category. `Other` cases carry free text in `custom_category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Dog,
    Cat,
    Cow,
    Other,
}

impl Category {
    pub const ALL: [Self; 4] = [Self::Dog, Self::Cat, Self::Cow, Self::Other];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dog => "Dog",
            Self::Cat => "Cat",
            Self::Cow => "Cow",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize free-text category input: trim, upper-case the first letter,
/// lower-case the remainder. No fuzzy matching.
#[must_use]
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    first
        .to_uppercase()
        .chain(chars.flat_map(char::to_lowercase))
        .collect()
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_category(s).as_str() {
            "Dog" => Ok(Self::Dog),
            "Cat" => Ok(Self::Cat),
            "Cow" => Ok(Self::Cow),
            "Other" => Ok(Self::Other),
            _ => Err(ParseEnumError {
                expected: "category",
                got: s.to_string(),
            }),
        }
    }
}

/// Rescue progress. A closed vocabulary; any value may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Unhandled,
    Collected,
    InTreatment,
    Resolved,
}

impl Status {
    pub const ALL: [Self; 4] = [
        Self::Unhandled,
        Self::Collected,
        Self::InTreatment,
        Self::Resolved,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unhandled => "Unhandled",
            Self::Collected => "Collected",
            Self::InTreatment => "InTreatment",
            Self::Resolved => "Resolved",
        }
    }

    /// Wording shown to reporters tracking their cases.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unhandled => "Yet to be picked up",
            Self::Collected => "Picked up",
            Self::InTreatment => "In treatment",
            Self::Resolved => "Treatment done",
        }
    }

    /// Zero-based position along the usual rescue path, for progress display.
    #[must_use]
    pub const fn stage(self) -> usize {
        match self {
            Self::Unhandled => 0,
            Self::Collected => 1,
            Self::InTreatment => 2,
            Self::Resolved => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    /// Exact match on the literal; no trimming or case folding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                expected: "status",
                got: s.to_string(),
            })
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub point: Point,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionEntry {
    pub text: String,
    pub contributor: ContributorId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoEntry {
    pub url: String,
    pub contributor: ContributorId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterEntry {
    pub display_name: String,
    pub contact: String,
    pub color_note: String,
    pub contributor: ContributorId,
    pub at: DateTime<Utc>,
    /// Free-text category, recorded only on `Other` cases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_category: Option<String>,
}

/// The durable record of one tracked rescue situation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_category: Option<String>,
    pub location: Point,
    pub location_history: Vec<LocationEntry>,
    pub descriptions: Vec<DescriptionEntry>,
    pub photos: Vec<PhotoEntry>,
    pub reporter_info: Vec<ReporterEntry>,
    pub contributors: BTreeSet<ContributorId>,
    pub status: Status,
    pub created_by: ContributorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by every committed write.
    pub version: u64,
}

/// One merge's worth of changes, applied atomically by a case store.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseDelta {
    pub contributor: ContributorId,
    /// Replaces the newest description, or becomes the first one.
    pub description: Option<DescriptionEntry>,
    pub photos: Vec<PhotoEntry>,
    pub reporter: ReporterEntry,
    pub location: Option<LocationEntry>,
    pub at: DateTime<Utc>,
}

impl Case {
    /// The description viewers see.
    #[must_use]
    pub fn current_description(&self) -> Option<&DescriptionEntry> {
        self.descriptions.last()
    }

    /// Apply a merge delta in place.
    ///
    /// Descriptions overwrite the newest entry; photos, reporter info and
    /// locations append; the contributor set only grows. Status and category
    /// are untouched.
    pub fn apply_delta(&mut self, delta: &CaseDelta) {
        if let Some(entry) = &delta.description {
            match self.descriptions.last_mut() {
                Some(last) => *last = entry.clone(),
                None => self.descriptions.push(entry.clone()),
            }
        }

        self.photos.extend(delta.photos.iter().cloned());
        self.reporter_info.push(delta.reporter.clone());

        if let Some(entry) = &delta.location {
            self.location = entry.point;
            self.location_history.push(entry.clone());
        }

        self.contributors.insert(delta.contributor.clone());
        self.updated_at = delta.at;
        self.version += 1;
    }

    /// List every record invariant this case currently violates.
    #[must_use]
    pub fn invariant_violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();

        if self.descriptions.is_empty() {
            violations.push("descriptions is empty");
        }
        if self.reporter_info.is_empty() {
            violations.push("reporter_info is empty");
        }
        match self.location_history.last() {
            None => violations.push("location_history is empty"),
            Some(entry) if entry.point != self.location => {
                violations.push("location differs from newest location_history entry");
            }
            Some(_) => {}
        }

        let contributors_cover = self
            .descriptions
            .iter()
            .map(|d| &d.contributor)
            .chain(self.photos.iter().map(|p| &p.contributor))
            .chain(self.reporter_info.iter().map(|r| &r.contributor))
            .all(|c| self.contributors.contains(c));
        if !contributors_cover {
            violations.push("contributors misses an entry author");
        }

        if self.category != Category::Other && self.custom_category.is_some() {
            violations.push("custom_category set on a non-Other case");
        }

        violations
    }
}
