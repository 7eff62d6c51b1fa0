use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::EngineError;
use crate::model::{Case, CaseId, Status};
use crate::store::CaseStore;

/// Parse a requested status against the fixed vocabulary.
///
/// # Errors
///
/// Returns [`EngineError::InvalidStatus`] for anything but the four literals.
pub fn parse_status(raw: &str) -> Result<Status, EngineError> {
    raw.parse().map_err(|_| EngineError::InvalidStatus {
        value: raw.to_string(),
    })
}

/// Applies administrator status changes. Any value may follow any other;
/// only membership in the vocabulary is checked.
pub struct StatusLifecycle<'a> {
    store: &'a dyn CaseStore,
}

impl<'a> StatusLifecycle<'a> {
    #[must_use]
    pub fn new(store: &'a dyn CaseStore) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// `InvalidStatus` for an unknown value (checked first), `NotFound` for
    /// an unknown case.
    pub fn set_status(
        &self,
        case_id: &CaseId,
        requested: &str,
        now: DateTime<Utc>,
    ) -> Result<Case, EngineError> {
        let status = parse_status(requested)?;
        let case = self.store.set_status(case_id, status, now)?;
        info!(%case_id, %status, "status changed");
        Ok(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::{
        Category, ContributorId, DescriptionEntry, LocationEntry, Point, ReporterEntry,
    };
    use crate::store::MemoryCaseStore;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn seeded_store() -> (MemoryCaseStore, CaseId) {
        let store = MemoryCaseStore::new();
        let who = ContributorId::new("asha");
        let point = Point::new(77.6, 12.9);
        let case = Case {
            id: CaseId::new_unchecked("case-life01"),
            category: Category::Cat,
            custom_category: None,
            location: point,
            location_history: vec![LocationEntry { point, at: ts(1) }],
            descriptions: vec![DescriptionEntry {
                text: "stuck on roof".to_string(),
                contributor: who.clone(),
                at: ts(1),
            }],
            photos: Vec::new(),
            reporter_info: vec![ReporterEntry {
                display_name: "Asha".to_string(),
                contact: String::new(),
                color_note: String::new(),
                contributor: who.clone(),
                at: ts(1),
                custom_category: None,
            }],
            contributors: BTreeSet::from([who.clone()]),
            status: Status::Unhandled,
            created_by: who,
            created_at: ts(1),
            updated_at: ts(1),
            version: 1,
        };
        store.insert(&case).expect("insert");
        (store, case.id)
    }

    #[test]
    fn any_order_of_valid_statuses_is_accepted() {
        let (store, id) = seeded_store();
        let lifecycle = StatusLifecycle::new(&store);

        let sequence = ["Resolved", "Unhandled", "InTreatment", "Collected", "Resolved"];
        for (step, raw) in (2_i64..).zip(sequence) {
            let case = lifecycle.set_status(&id, raw, ts(step)).expect("set status");
            assert_eq!(case.status.as_str(), raw);
            assert_eq!(case.updated_at, ts(step));
        }
    }

    #[test]
    fn unknown_status_is_rejected_without_touching_case() {
        let (store, id) = seeded_store();
        let lifecycle = StatusLifecycle::new(&store);

        for raw in [
            "Closed",
            "in treatment",
            "",
            "Resolved!",
            "resolved",
            "  COLLECTED ",
            "intreatment",
        ] {
            let err = lifecycle.set_status(&id, raw, ts(2)).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidStatus, "{raw:?}");
        }
        let case = store.get(&id).expect("get").expect("exists");
        assert_eq!(case.status, Status::Unhandled);
        assert_eq!(case.version, 1);
    }

    #[test]
    fn missing_case_is_not_found() {
        let (store, _) = seeded_store();
        let lifecycle = StatusLifecycle::new(&store);
        let err = lifecycle
            .set_status(&CaseId::new_unchecked("case-nope"), "Collected", ts(2))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CaseNotFound);
    }
}
