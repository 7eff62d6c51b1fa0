//! Applying confirmed submissions: open a new case or merge into one.
//!
//! Merge semantics per field:
//! - description: overwrites the newest entry, appends only when none exist
//! - photos, reporter info, location history: append
//! - contributors: set insert
//! - status, category: untouched
//!
//! Merges into the same case are serialized by an in-process per-case lock
//! and, across processes, by the store's version compare-and-swap. A lost
//! race is retried a bounded number of times.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::blob::{self, BlobStore};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::geo::GeoIndex;
use crate::lock::CaseLocks;
use crate::model::{
    Case, CaseDelta, CaseId, Category, ContributorId, DescriptionEntry, LocationEntry, PhotoEntry,
    PhotoSource, ReporterEntry, Status, Submission, normalize_category,
};
use crate::store::CaseStore;

/// Description recorded when a new case is opened without one.
pub const DEFAULT_DESCRIPTION: &str = "No description provided";

/// Result of a create or merge.
///
/// `photo_error` is set when the photo upload failed; the contribution was
/// still committed, just without the photo.
#[derive(Debug)]
pub struct Contribution {
    pub case: Case,
    pub photo_error: Option<EngineError>,
}

/// Photo URL resolved from a submission, or the upstream failure that
/// prevented it.
struct ResolvedPhoto {
    url: Option<String>,
    error: Option<EngineError>,
}

pub struct CaseAggregator<'a> {
    store: &'a dyn CaseStore,
    index: &'a GeoIndex,
    locks: &'a CaseLocks,
    blobs: &'a dyn BlobStore,
    config: &'a EngineConfig,
}

impl<'a> CaseAggregator<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn CaseStore,
        index: &'a GeoIndex,
        locks: &'a CaseLocks,
        blobs: &'a dyn BlobStore,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            index,
            locks,
            blobs,
            config,
        }
    }

    /// Open a new `Unhandled` case from a submission and index it.
    ///
    /// # Errors
    ///
    /// Validation errors for a missing or unknown category, missing or
    /// out-of-range coordinates, or an unacceptable photo; storage errors
    /// from the insert.
    pub fn create_case(
        &self,
        contributor: &ContributorId,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> Result<Contribution, EngineError> {
        let category = required_category(submission)?;
        let point = submission
            .point
            .ok_or_else(|| EngineError::validation("location", "coordinates are required"))?;
        point.validate()?;

        let custom_category = match category {
            Category::Other => custom_text(submission.custom_category.as_deref()),
            _ => None,
        };

        let photo = self.resolve_photo(submission.photo.as_ref())?;

        let text = submission
            .description_text()
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string();

        let case = Case {
            id: CaseId::generate(contributor, now),
            category,
            custom_category: custom_category.clone(),
            location: point,
            location_history: vec![LocationEntry { point, at: now }],
            descriptions: vec![DescriptionEntry {
                text,
                contributor: contributor.clone(),
                at: now,
            }],
            photos: photo
                .url
                .map(|url| PhotoEntry {
                    url,
                    contributor: contributor.clone(),
                    at: now,
                })
                .into_iter()
                .collect(),
            reporter_info: vec![reporter_entry(submission, contributor, now, custom_category)],
            contributors: BTreeSet::from([contributor.clone()]),
            status: Status::Unhandled,
            created_by: contributor.clone(),
            created_at: now,
            updated_at: now,
            version: 1,
        };

        self.store.insert(&case)?;
        self.index.upsert(&case.id, case.location, case.category);

        info!(
            case_id = %case.id,
            category = %case.category,
            location = %case.location,
            contributor = %contributor,
            "opened case"
        );

        Ok(Contribution {
            case,
            photo_error: photo.error,
        })
    }

    /// Merge a submission into an existing case.
    ///
    /// The submission's category is ignored; merges never change category
    /// or status.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown case, validation errors for bad coordinates
    /// or photo, `Timeout` if the case stays locked past the configured
    /// timeout, `Conflict` once retries are exhausted.
    pub fn merge_into_case(
        &self,
        contributor: &ContributorId,
        case_id: &CaseId,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> Result<Contribution, EngineError> {
        if let Some(point) = submission.point {
            point.validate()?;
        }
        if self.store.get(case_id)?.is_none() {
            return Err(EngineError::not_found(case_id));
        }

        let photo = self.resolve_photo(submission.photo.as_ref())?;

        let guard = self.locks.acquire(case_id, self.config.store.lock_timeout())?;
        let max_attempts = self.config.store.conflict_retries.saturating_add(1);
        let mut attempt = 0_u32;

        let case = loop {
            attempt += 1;
            let current = self
                .store
                .get(case_id)?
                .ok_or_else(|| EngineError::not_found(case_id))?;
            let delta = build_delta(&current, contributor, submission, photo.url.as_deref(), now);

            match self.store.apply(case_id, current.version, &delta) {
                Ok(updated) => break updated,
                Err(EngineError::Conflict { .. }) if attempt < max_attempts => {
                    warn!(%case_id, attempt, "version moved under merge, retrying");
                }
                Err(EngineError::Conflict { case_id, .. }) => {
                    return Err(EngineError::Conflict {
                        case_id,
                        attempts: attempt,
                    });
                }
                Err(other) => return Err(other),
            }
        };

        if submission.point.is_some() {
            self.index.upsert(&case.id, case.location, case.category);
        }
        guard.release();

        info!(
            %case_id,
            contributor = %contributor,
            attempts = attempt,
            photos = case.photos.len(),
            contributors = case.contributors.len(),
            "merged contribution"
        );

        Ok(Contribution {
            case,
            photo_error: photo.error,
        })
    }

    /// Turn a submission's photo into a URL.
    ///
    /// Bad uploads fail validation before anything is written. Upload
    /// failures are reported but do not fail the contribution.
    fn resolve_photo(&self, source: Option<&PhotoSource>) -> Result<ResolvedPhoto, EngineError> {
        match source {
            None => Ok(ResolvedPhoto {
                url: None,
                error: None,
            }),
            Some(PhotoSource::Url(url)) => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(EngineError::validation("photo", "photo URL is blank"));
                }
                Ok(ResolvedPhoto {
                    url: Some(url.to_string()),
                    error: None,
                })
            }
            Some(PhotoSource::Upload {
                bytes,
                content_type,
            }) => {
                blob::validate_upload(bytes, content_type, &self.config.photos)?;
                match self.blobs.put(bytes, content_type) {
                    Ok(url) => Ok(ResolvedPhoto {
                        url: Some(url),
                        error: None,
                    }),
                    Err(err) => {
                        warn!(error = %err, "photo upload failed, continuing without photo");
                        Ok(ResolvedPhoto {
                            url: None,
                            error: Some(err.into()),
                        })
                    }
                }
            }
        }
    }
}

fn required_category(submission: &Submission) -> Result<Category, EngineError> {
    let normalized = normalize_category(submission.category.as_deref().unwrap_or_default());
    if normalized.is_empty() {
        return Err(EngineError::validation("category", "category is required"));
    }
    normalized.parse().map_err(|_| {
        EngineError::validation(
            "category",
            format!("unknown category '{normalized}': expected Dog, Cat, Cow or Other"),
        )
    })
}

fn custom_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn reporter_entry(
    submission: &Submission,
    contributor: &ContributorId,
    at: DateTime<Utc>,
    custom_category: Option<String>,
) -> ReporterEntry {
    ReporterEntry {
        display_name: submission.reporter.display_name.trim().to_string(),
        contact: submission.reporter.contact.trim().to_string(),
        color_note: submission.reporter.color_note.trim().to_string(),
        contributor: contributor.clone(),
        at,
        custom_category,
    }
}

fn build_delta(
    case: &Case,
    contributor: &ContributorId,
    submission: &Submission,
    photo_url: Option<&str>,
    now: DateTime<Utc>,
) -> CaseDelta {
    let custom_category = match case.category {
        Category::Other => custom_text(submission.custom_category.as_deref())
            .or_else(|| case.custom_category.clone()),
        _ => None,
    };

    CaseDelta {
        contributor: contributor.clone(),
        description: submission.description_text().map(|text| DescriptionEntry {
            text: text.to_string(),
            contributor: contributor.clone(),
            at: now,
        }),
        photos: photo_url
            .map(|url| PhotoEntry {
                url: url.to_string(),
                contributor: contributor.clone(),
                at: now,
            })
            .into_iter()
            .collect(),
        reporter: reporter_entry(submission, contributor, now, custom_category),
        location: submission.point.map(|point| LocationEntry { point, at: now }),
        at: now,
    }
}
