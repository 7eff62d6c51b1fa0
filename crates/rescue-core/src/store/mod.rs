//! Durable case storage.
//!
//! A [`CaseStore`] owns every case record. Contributions are applied with
//! [`CaseStore::apply`], which is atomic per case and guarded by the case's
//! `version` counter: the write only lands if the stored version still
//! equals the version the caller read. Appends are individual additions,
//! never a rewrite of a whole list.

pub mod memory;

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::model::{Case, CaseDelta, CaseId, Category, ContributorId, Point, Status};

pub use memory::MemoryCaseStore;

/// Sort order for case listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recently opened first (dashboard default).
    #[default]
    CreatedDesc,
    /// Most recently touched first.
    UpdatedDesc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatedDesc => f.write_str("created_desc"),
            Self::UpdatedDesc => f.write_str("updated_desc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_desc" | "created-desc" | "newest" => Ok(Self::CreatedDesc),
            "updated_desc" | "updated-desc" | "recent" => Ok(Self::UpdatedDesc),
            other => anyhow::bail!(
                "unknown sort order '{other}': expected one of created_desc, updated_desc"
            ),
        }
    }
}

/// Filter criteria for case listings.
///
/// All fields are optional. When multiple fields are set, they are combined
/// with AND semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilter {
    pub status: Option<Status>,
    pub category: Option<Category>,
    /// Only cases this identity has contributed to.
    pub contributor: Option<ContributorId>,
    pub sort: SortOrder,
}

impl CaseFilter {
    #[must_use]
    pub fn matches(&self, case: &Case) -> bool {
        self.status.is_none_or(|status| case.status == status)
            && self.category.is_none_or(|category| case.category == category)
            && self
                .contributor
                .as_ref()
                .is_none_or(|who| case.contributors.contains(who))
    }

    /// Sort a listing in place according to `self.sort`, ties by id.
    pub fn sort(&self, cases: &mut [Case]) {
        match self.sort {
            SortOrder::CreatedDesc => cases.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            SortOrder::UpdatedDesc => cases.sort_by(|a, b| {
                b.updated_at
                    .cmp(&a.updated_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

/// A case's indexable position, used to rebuild the geospatial index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedLocation {
    pub case_id: CaseId,
    pub category: Category,
    pub point: Point,
}

/// Storage backend for case records.
///
/// Implementations must make each method atomic for the case it touches and
/// safe to call from many threads.
pub trait CaseStore: Send + Sync {
    /// Persist a newly built case.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    fn insert(&self, case: &Case) -> Result<(), EngineError>;

    /// # Errors
    ///
    /// Returns a storage or timeout error if the read fails.
    fn get(&self, case_id: &CaseId) -> Result<Option<Case>, EngineError>;

    /// Apply a contribution if the stored version is still `expected_version`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the case is gone, `Conflict` if another writer got
    /// there first, storage/timeout errors otherwise.
    fn apply(
        &self,
        case_id: &CaseId,
        expected_version: u64,
        delta: &CaseDelta,
    ) -> Result<Case, EngineError>;

    /// Overwrite the status unconditionally.
    ///
    /// # Errors
    ///
    /// `NotFound` if the case does not exist.
    fn set_status(
        &self,
        case_id: &CaseId,
        status: Status,
        at: DateTime<Utc>,
    ) -> Result<Case, EngineError>;

    /// Purge a case and detach it from every contributor. Returns the removed
    /// record, or `None` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    fn delete(&self, case_id: &CaseId) -> Result<Option<Case>, EngineError>;

    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn list(&self, filter: &CaseFilter) -> Result<Vec<Case>, EngineError>;

    /// Current location and category of every case.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn locations(&self) -> Result<Vec<IndexedLocation>, EngineError>;

    /// Opaque token that changes whenever cases may have been written by
    /// some other handle on the same storage. Equal tokens mean nothing
    /// moved.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the token cannot be read.
    fn data_version(&self) -> Result<u64, EngineError>;
}
