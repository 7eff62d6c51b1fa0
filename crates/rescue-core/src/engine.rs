//! The engine facade: every operation the outside world may call, each
//! taking the authenticated [`Caller`].

use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::access::{Action, Caller};
use crate::aggregate::{CaseAggregator, Contribution};
use crate::blob::BlobStore;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::geo::GeoIndex;
use crate::lifecycle::StatusLifecycle;
use crate::lock::CaseLocks;
use crate::matcher::{Candidate, ProximityMatcher};
use crate::model::{Case, CaseId, Category, Point, Submission};
use crate::store::{CaseFilter, CaseStore, SortOrder};

pub struct Engine {
    store: Arc<dyn CaseStore>,
    blobs: Arc<dyn BlobStore>,
    index: GeoIndex,
    /// Store data version the index was last built against. Writers through
    /// this engine hold it shared; a resync holds it exclusively.
    index_version: RwLock<u64>,
    locks: CaseLocks,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("indexed_cases", &self.index.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine over `store`, rebuilding the geospatial index from
    /// the stored case locations.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the locations cannot be read.
    pub fn open(
        store: Arc<dyn CaseStore>,
        blobs: Arc<dyn BlobStore>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let index = GeoIndex::new();
        let version = store.data_version()?;
        let cases = index.rebuild(indexable(store.as_ref())?);
        info!(cases, "geospatial index rebuilt");

        Ok(Self {
            store,
            blobs,
            index,
            index_version: RwLock::new(version),
            locks: CaseLocks::new(),
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn index(&self) -> &GeoIndex {
        &self.index
    }

    /// Rebuild the index when another handle on the same store has written
    /// since the last build.
    fn sync_index(&self) -> Result<(), EngineError> {
        let seen = *self.index_version.read().unwrap_or_else(PoisonError::into_inner);
        if self.store.data_version()? == seen {
            return Ok(());
        }

        let mut seen = self
            .index_version
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let current = self.store.data_version()?;
        if current == *seen {
            return Ok(());
        }
        let cases = self.index.rebuild(indexable(self.store.as_ref())?);
        *seen = current;
        debug!(cases, version = current, "geospatial index resynced");
        Ok(())
    }

    /// Held across a store write and the matching index update.
    fn index_writer(&self) -> RwLockReadGuard<'_, u64> {
        self.index_version.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn aggregator(&self) -> CaseAggregator<'_> {
        CaseAggregator::new(
            self.store.as_ref(),
            &self.index,
            &self.locks,
            self.blobs.as_ref(),
            &self.config,
        )
    }

    /// Nearby cases of the same category, nearest first.
    ///
    /// # Errors
    ///
    /// Validation errors for a blank category or bad coordinates.
    pub fn find_candidates(
        &self,
        caller: &Caller,
        category: &str,
        point: Point,
    ) -> Result<Vec<Candidate>, EngineError> {
        caller.authorize(Action::FindCandidates)?;
        self.sync_index()?;
        ProximityMatcher::new(&self.index, self.store.as_ref(), &self.config.matching)
            .find_candidates(category, point)
    }

    /// Open a new case attributed to the caller.
    ///
    /// # Errors
    ///
    /// Validation, storage and access errors; photo upload failures are
    /// reported on the returned [`Contribution`] instead.
    pub fn create_case(
        &self,
        caller: &Caller,
        submission: &Submission,
    ) -> Result<Contribution, EngineError> {
        caller.authorize(Action::CreateCase)?;
        let writing = self.index_writer();
        let created = self
            .aggregator()
            .create_case(&caller.contributor, submission, Utc::now());
        drop(writing);
        created
    }

    /// Merge the caller's submission into an existing case.
    ///
    /// # Errors
    ///
    /// `NotFound`, validation, `Timeout` or `Conflict` errors.
    pub fn merge_into_case(
        &self,
        caller: &Caller,
        case_id: &CaseId,
        submission: &Submission,
    ) -> Result<Contribution, EngineError> {
        caller.authorize(Action::MergeIntoCase)?;
        let writing = self.index_writer();
        let merged = self
            .aggregator()
            .merge_into_case(&caller.contributor, case_id, submission, Utc::now());
        drop(writing);
        merged
    }

    /// # Errors
    ///
    /// `AccessDenied` for reporters, `InvalidStatus`, `NotFound`.
    pub fn set_status(
        &self,
        caller: &Caller,
        case_id: &CaseId,
        status: &str,
    ) -> Result<Case, EngineError> {
        caller.authorize(Action::SetStatus)?;
        StatusLifecycle::new(self.store.as_ref()).set_status(case_id, status, Utc::now())
    }

    /// Dashboard listing with optional status/category filters.
    ///
    /// # Errors
    ///
    /// `AccessDenied` for reporters, storage errors.
    pub fn list_cases(
        &self,
        caller: &Caller,
        filter: &CaseFilter,
    ) -> Result<Vec<Case>, EngineError> {
        caller.authorize(Action::ListCases)?;
        self.store.list(filter)
    }

    /// Purge a case, drop it from the geospatial index and detach it from
    /// every contributor.
    ///
    /// # Errors
    ///
    /// `AccessDenied` for reporters, `NotFound` if the case does not exist,
    /// `Timeout` if a merge holds the case too long.
    pub fn delete_case(&self, caller: &Caller, case_id: &CaseId) -> Result<(), EngineError> {
        caller.authorize(Action::DeleteCase)?;
        let writing = self.index_writer();
        let guard = self
            .locks
            .acquire(case_id, self.config.store.lock_timeout())?;

        let removed = self
            .store
            .delete(case_id)?
            .ok_or_else(|| EngineError::not_found(case_id))?;
        let was_indexed = self.index.remove(case_id);
        guard.release();
        drop(writing);

        debug!(%case_id, was_indexed, "removed from index");
        info!(
            %case_id,
            contributors = removed.contributors.len(),
            by = %caller.contributor,
            "deleted case"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown case.
    pub fn get_case(&self, caller: &Caller, case_id: &CaseId) -> Result<Case, EngineError> {
        caller.authorize(Action::ViewCase)?;
        self.store
            .get(case_id)?
            .ok_or_else(|| EngineError::not_found(case_id))
    }

    /// Cases the caller has contributed to, most recently updated first.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn my_cases(&self, caller: &Caller) -> Result<Vec<Case>, EngineError> {
        caller.authorize(Action::ViewCase)?;
        self.store.list(&CaseFilter {
            contributor: Some(caller.contributor.clone()),
            sort: SortOrder::UpdatedDesc,
            ..CaseFilter::default()
        })
    }
}

fn indexable(
    store: &dyn CaseStore,
) -> Result<impl Iterator<Item = (CaseId, Point, Category)>, EngineError> {
    Ok(store
        .locations()?
        .into_iter()
        .map(|location| (location.case_id, location.point, location.category)))
}
