use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{CaseFilter, CaseStore, IndexedLocation};
use crate::error::EngineError;
use crate::model::{Case, CaseDelta, CaseId, ContributorId, Status};

#[derive(Debug, Default)]
struct MemoryInner {
    cases: HashMap<CaseId, Case>,
    /// Reverse index: which cases each contributor has touched.
    by_contributor: HashMap<ContributorId, BTreeSet<CaseId>>,
}

/// Volatile store for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    inner: RwLock<MemoryInner>,
    /// Bumped by every mutation.
    version: AtomicU64,
}

impl MemoryCaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn touched(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Case ids recorded against a contributor.
    #[must_use]
    pub fn case_ids_of(&self, contributor: &ContributorId) -> Vec<CaseId> {
        self.read()
            .by_contributor
            .get(contributor)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl CaseStore for MemoryCaseStore {
    fn insert(&self, case: &Case) -> Result<(), EngineError> {
        let mut inner = self.write();
        for contributor in &case.contributors {
            inner
                .by_contributor
                .entry(contributor.clone())
                .or_default()
                .insert(case.id.clone());
        }
        inner.cases.insert(case.id.clone(), case.clone());
        self.touched();
        Ok(())
    }

    fn get(&self, case_id: &CaseId) -> Result<Option<Case>, EngineError> {
        Ok(self.read().cases.get(case_id).cloned())
    }

    fn apply(
        &self,
        case_id: &CaseId,
        expected_version: u64,
        delta: &CaseDelta,
    ) -> Result<Case, EngineError> {
        let mut inner = self.write();
        let case = inner
            .cases
            .get_mut(case_id)
            .ok_or_else(|| EngineError::not_found(case_id))?;
        if case.version != expected_version {
            return Err(EngineError::Conflict {
                case_id: case_id.clone(),
                attempts: 1,
            });
        }

        case.apply_delta(delta);
        let updated = case.clone();
        inner
            .by_contributor
            .entry(delta.contributor.clone())
            .or_default()
            .insert(case_id.clone());
        self.touched();
        Ok(updated)
    }

    fn set_status(
        &self,
        case_id: &CaseId,
        status: Status,
        at: DateTime<Utc>,
    ) -> Result<Case, EngineError> {
        let mut inner = self.write();
        let case = inner
            .cases
            .get_mut(case_id)
            .ok_or_else(|| EngineError::not_found(case_id))?;
        case.status = status;
        case.updated_at = at;
        case.version += 1;
        let updated = case.clone();
        self.touched();
        Ok(updated)
    }

    fn delete(&self, case_id: &CaseId) -> Result<Option<Case>, EngineError> {
        let mut inner = self.write();
        let Some(case) = inner.cases.remove(case_id) else {
            return Ok(None);
        };
        for contributor in &case.contributors {
            if let Some(ids) = inner.by_contributor.get_mut(contributor) {
                ids.remove(case_id);
                if ids.is_empty() {
                    inner.by_contributor.remove(contributor);
                }
            }
        }
        self.touched();
        Ok(Some(case))
    }

    fn list(&self, filter: &CaseFilter) -> Result<Vec<Case>, EngineError> {
        let inner = self.read();
        let mut cases: Vec<Case> = match &filter.contributor {
            Some(who) => inner
                .by_contributor
                .get(who)
                .into_iter()
                .flatten()
                .filter_map(|id| inner.cases.get(id))
                .filter(|case| filter.matches(case))
                .cloned()
                .collect(),
            None => inner
                .cases
                .values()
                .filter(|case| filter.matches(case))
                .cloned()
                .collect(),
        };
        drop(inner);
        filter.sort(&mut cases);
        Ok(cases)
    }

    fn locations(&self) -> Result<Vec<IndexedLocation>, EngineError> {
        Ok(self
            .read()
            .cases
            .values()
            .map(|case| IndexedLocation {
                case_id: case.id.clone(),
                category: case.category,
                point: case.location,
            })
            .collect())
    }

    fn data_version(&self) -> Result<u64, EngineError> {
        Ok(self.version.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Category, DescriptionEntry, LocationEntry, Point, ReporterEntry,
    };
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn who(name: &str) -> ContributorId {
        ContributorId::new(name)
    }

    fn reporter(name: &str, at: i64) -> ReporterEntry {
        ReporterEntry {
            display_name: name.to_string(),
            contact: String::new(),
            color_note: String::new(),
            contributor: who(name),
            at: ts(at),
            custom_category: None,
        }
    }

    fn make_case(id: &str, category: Category, by: &str, at: i64) -> Case {
        let point = Point::new(77.6, 12.9);
        Case {
            id: CaseId::new_unchecked(id),
            category,
            custom_category: None,
            location: point,
            location_history: vec![LocationEntry { point, at: ts(at) }],
            descriptions: vec![DescriptionEntry {
                text: "seen".to_string(),
                contributor: who(by),
                at: ts(at),
            }],
            photos: Vec::new(),
            reporter_info: vec![reporter(by, at)],
            contributors: BTreeSet::from([who(by)]),
            status: Status::Unhandled,
            created_by: who(by),
            created_at: ts(at),
            updated_at: ts(at),
            version: 1,
        }
    }

    fn delta(by: &str, at: i64) -> CaseDelta {
        CaseDelta {
            contributor: who(by),
            description: None,
            photos: Vec::new(),
            reporter: reporter(by, at),
            location: None,
            at: ts(at),
        }
    }

    #[test]
    fn apply_rejects_stale_version() {
        let store = MemoryCaseStore::new();
        store
            .insert(&make_case("case-a", Category::Dog, "asha", 1))
            .expect("insert");

        let updated = store
            .apply(&CaseId::new_unchecked("case-a"), 1, &delta("ravi", 2))
            .expect("first apply");
        assert_eq!(updated.version, 2);

        let err = store
            .apply(&CaseId::new_unchecked("case-a"), 1, &delta("mei", 3))
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
    }

    #[test]
    fn apply_and_status_on_missing_case_are_not_found() {
        let store = MemoryCaseStore::new();
        let missing = CaseId::new_unchecked("case-missing");
        assert!(matches!(
            store.apply(&missing, 1, &delta("asha", 1)),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            store.set_status(&missing, Status::Resolved, ts(1)),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_detaches_case_from_contributors() {
        let store = MemoryCaseStore::new();
        let id = CaseId::new_unchecked("case-a");
        store
            .insert(&make_case("case-a", Category::Dog, "asha", 1))
            .expect("insert");
        store.apply(&id, 1, &delta("ravi", 2)).expect("merge");
        assert_eq!(store.case_ids_of(&who("ravi")), vec![id.clone()]);

        let removed = store.delete(&id).expect("delete");
        assert!(removed.is_some());
        assert!(store.case_ids_of(&who("asha")).is_empty());
        assert!(store.case_ids_of(&who("ravi")).is_empty());
        assert!(store.delete(&id).expect("second delete").is_none());
    }

    #[test]
    fn data_version_moves_only_on_writes() {
        let store = MemoryCaseStore::new();
        let id = CaseId::new_unchecked("case-a");
        let start = store.data_version().expect("version");

        store
            .insert(&make_case("case-a", Category::Dog, "asha", 1))
            .expect("insert");
        let inserted = store.data_version().expect("version");
        assert_ne!(inserted, start);

        store.get(&id).expect("get");
        store.list(&CaseFilter::default()).expect("list");
        assert_eq!(store.data_version().expect("version"), inserted);

        store.apply(&id, 1, &delta("ravi", 2)).expect("merge");
        let merged = store.data_version().expect("version");
        assert_ne!(merged, inserted);

        assert!(store.apply(&id, 1, &delta("mei", 3)).is_err());
        assert_eq!(store.data_version().expect("version"), merged);
    }

    #[test]
    fn list_filters_and_sorts_newest_first() {
        let store = MemoryCaseStore::new();
        store
            .insert(&make_case("case-a", Category::Dog, "asha", 1))
            .expect("insert");
        store
            .insert(&make_case("case-b", Category::Cat, "asha", 2))
            .expect("insert");
        store
            .insert(&make_case("case-c", Category::Dog, "ravi", 3))
            .expect("insert");
        store
            .set_status(&CaseId::new_unchecked("case-c"), Status::Collected, ts(4))
            .expect("status");

        let all = store.list(&CaseFilter::default()).expect("list");
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["case-c", "case-b", "case-a"]);

        let dogs = store
            .list(&CaseFilter {
                category: Some(Category::Dog),
                status: Some(Status::Unhandled),
                ..CaseFilter::default()
            })
            .expect("list dogs");
        assert_eq!(dogs.len(), 1);
        assert_eq!(dogs[0].id.as_str(), "case-a");

        let mine = store
            .list(&CaseFilter {
                contributor: Some(who("asha")),
                ..CaseFilter::default()
            })
            .expect("list mine");
        assert_eq!(mine.len(), 2);
    }
}
