//! SQLite-backed [`CaseStore`].
//!
//! Every write runs inside a `BEGIN IMMEDIATE` transaction. Contributions
//! bump `cases.version` with a compare-and-swap `UPDATE ... WHERE version = ?`
//! and then insert child rows, so concurrent writers from other processes
//! either see the new version or get a conflict, never a lost append.
//! Reads of a whole case run in one deferred transaction so a concurrent
//! writer can never leave them with half a contribution.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::EngineError;
use crate::model::{
    Case, CaseDelta, CaseId, ContributorId, DescriptionEntry, LocationEntry, ParseEnumError,
    PhotoEntry, Point, ReporterEntry, Status,
};
use crate::store::{CaseFilter, CaseStore, IndexedLocation, SortOrder};

/// Case store persisted in a single SQLite database file.
#[derive(Debug)]
pub struct SqliteCaseStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteCaseStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        let conn = super::open_database(path, busy_timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: Mutex::new(super::open_in_memory()?),
            path: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaseStore for SqliteCaseStore {
    fn insert(&self, case: &Case) -> Result<(), EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO cases (
                case_id, category, custom_category, status, lng, lat,
                created_by, created_at_us, updated_at_us, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                case.id.as_str(),
                case.category.as_str(),
                case.custom_category,
                case.status.as_str(),
                case.location.lng,
                case.location.lat,
                case.created_by.as_str(),
                case.created_at.timestamp_micros(),
                case.updated_at.timestamp_micros(),
                version_param(case.version)?,
            ],
        )?;

        for entry in &case.location_history {
            insert_location(&tx, &case.id, entry)?;
        }
        for entry in &case.descriptions {
            insert_description(&tx, &case.id, entry)?;
        }
        for entry in &case.photos {
            insert_photo(&tx, &case.id, entry)?;
        }
        for entry in &case.reporter_info {
            insert_reporter(&tx, &case.id, entry)?;
        }
        for contributor in &case.contributors {
            insert_contributor(&tx, &case.id, contributor, case.created_at)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get(&self, case_id: &CaseId) -> Result<Option<Case>, EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let case = read_case(&tx, case_id)?;
        tx.commit()?;
        Ok(case)
    }

    fn apply(
        &self,
        case_id: &CaseId,
        expected_version: u64,
        delta: &CaseDelta,
    ) -> Result<Case, EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let moved_to = delta.location.as_ref().map(|entry| entry.point);
        let changed = tx.execute(
            "UPDATE cases
             SET version = version + 1,
                 updated_at_us = ?1,
                 lng = COALESCE(?2, lng),
                 lat = COALESCE(?3, lat)
             WHERE case_id = ?4 AND version = ?5",
            params![
                delta.at.timestamp_micros(),
                moved_to.map(|point| point.lng),
                moved_to.map(|point| point.lat),
                case_id.as_str(),
                version_param(expected_version)?,
            ],
        )?;

        if changed == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM cases WHERE case_id = ?1)",
                [case_id.as_str()],
                |row| row.get(0),
            )?;
            return Err(if exists {
                EngineError::Conflict {
                    case_id: case_id.clone(),
                    attempts: 1,
                }
            } else {
                EngineError::not_found(case_id)
            });
        }

        if let Some(entry) = &delta.description {
            let replaced = tx.execute(
                "UPDATE case_descriptions
                 SET body = ?1, contributor = ?2, at_us = ?3
                 WHERE entry_id = (
                     SELECT MAX(entry_id) FROM case_descriptions WHERE case_id = ?4
                 )",
                params![
                    entry.text,
                    entry.contributor.as_str(),
                    entry.at.timestamp_micros(),
                    case_id.as_str(),
                ],
            )?;
            if replaced == 0 {
                insert_description(&tx, case_id, entry)?;
            }
        }
        for entry in &delta.photos {
            insert_photo(&tx, case_id, entry)?;
        }
        insert_reporter(&tx, case_id, &delta.reporter)?;
        if let Some(entry) = &delta.location {
            insert_location(&tx, case_id, entry)?;
        }
        insert_contributor(&tx, case_id, &delta.contributor, delta.at)?;

        let updated = read_case(&tx, case_id)?.ok_or_else(|| EngineError::not_found(case_id))?;
        tx.commit()?;
        Ok(updated)
    }

    fn set_status(
        &self,
        case_id: &CaseId,
        status: Status,
        at: DateTime<Utc>,
    ) -> Result<Case, EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE cases
             SET status = ?1, updated_at_us = ?2, version = version + 1
             WHERE case_id = ?3",
            params![status.as_str(), at.timestamp_micros(), case_id.as_str()],
        )?;
        if changed == 0 {
            return Err(EngineError::not_found(case_id));
        }
        let updated = read_case(&tx, case_id)?.ok_or_else(|| EngineError::not_found(case_id))?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete(&self, case_id: &CaseId) -> Result<Option<Case>, EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(case) = read_case(&tx, case_id)? else {
            return Ok(None);
        };
        tx.execute("DELETE FROM cases WHERE case_id = ?1", [case_id.as_str()])?;
        tx.commit()?;
        Ok(Some(case))
    }

    fn list(&self, filter: &CaseFilter) -> Result<Vec<Case>, EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut conditions: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            param_values.push(Box::new(status.as_str()));
            conditions.push(format!("c.status = ?{}", param_values.len()));
        }
        if let Some(category) = filter.category {
            param_values.push(Box::new(category.as_str()));
            conditions.push(format!("c.category = ?{}", param_values.len()));
        }
        if let Some(contributor) = &filter.contributor {
            param_values.push(Box::new(contributor.as_str().to_string()));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM case_contributors cc
                         WHERE cc.case_id = c.case_id AND cc.contributor = ?{})",
                param_values.len()
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let order_clause = match filter.sort {
            SortOrder::CreatedDesc => " ORDER BY c.created_at_us DESC, c.case_id ASC",
            SortOrder::UpdatedDesc => " ORDER BY c.updated_at_us DESC, c.case_id ASC",
        };
        let sql = format!("SELECT c.case_id FROM cases c{where_clause}{order_clause}");

        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(AsRef::as_ref).collect();
        let mut stmt = tx.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(params_ref), |row| {
                row.get::<_, String>(0).map(CaseId::new_unchecked)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut cases = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(case) = read_case(&tx, id)? {
                cases.push(case);
            }
        }
        tx.commit()?;
        Ok(cases)
    }

    fn locations(&self) -> Result<Vec<IndexedLocation>, EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut stmt = tx.prepare("SELECT case_id, category, lng, lat FROM cases")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(IndexedLocation {
                    case_id: CaseId::new_unchecked(row.get::<_, String>(0)?),
                    category: parse_column(row, 1)?,
                    point: Point::new(row.get(2)?, row.get(3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        tx.commit()?;
        Ok(rows)
    }

    /// `PRAGMA data_version`: unchanged by this connection's own commits,
    /// bumped by commits from any other connection.
    fn data_version(&self) -> Result<u64, EngineError> {
        let raw: i64 = self
            .conn()
            .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        u64::try_from(raw)
            .context("sqlite reported a negative data_version")
            .map_err(EngineError::Storage)
    }
}

fn version_param(version: u64) -> Result<i64, EngineError> {
    i64::try_from(version)
        .context("case version exceeds sqlite integer range")
        .map_err(EngineError::Storage)
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|err: ParseEnumError| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
    })
}

fn micros_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let us: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(us).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, us))
}

fn version_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn insert_location(
    conn: &Connection,
    case_id: &CaseId,
    entry: &LocationEntry,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO case_locations (case_id, lng, lat, at_us) VALUES (?1, ?2, ?3, ?4)",
        params![
            case_id.as_str(),
            entry.point.lng,
            entry.point.lat,
            entry.at.timestamp_micros()
        ],
    )?;
    Ok(())
}

fn insert_description(
    conn: &Connection,
    case_id: &CaseId,
    entry: &DescriptionEntry,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO case_descriptions (case_id, body, contributor, at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            case_id.as_str(),
            entry.text,
            entry.contributor.as_str(),
            entry.at.timestamp_micros()
        ],
    )?;
    Ok(())
}

fn insert_photo(conn: &Connection, case_id: &CaseId, entry: &PhotoEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO case_photos (case_id, url, contributor, at_us) VALUES (?1, ?2, ?3, ?4)",
        params![
            case_id.as_str(),
            entry.url,
            entry.contributor.as_str(),
            entry.at.timestamp_micros()
        ],
    )?;
    Ok(())
}

fn insert_reporter(
    conn: &Connection,
    case_id: &CaseId,
    entry: &ReporterEntry,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO case_reporters (
            case_id, display_name, contact, color_note, contributor, custom_category, at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            case_id.as_str(),
            entry.display_name,
            entry.contact,
            entry.color_note,
            entry.contributor.as_str(),
            entry.custom_category,
            entry.at.timestamp_micros()
        ],
    )?;
    Ok(())
}

fn insert_contributor(
    conn: &Connection,
    case_id: &CaseId,
    contributor: &ContributorId,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO case_contributors (case_id, contributor, added_at_us)
         VALUES (?1, ?2, ?3)",
        params![case_id.as_str(), contributor.as_str(), at.timestamp_micros()],
    )?;
    Ok(())
}

/// Load a full case record, or `None` if the id is unknown.
fn read_case(conn: &Connection, case_id: &CaseId) -> Result<Option<Case>, EngineError> {
    let head = conn
        .query_row(
            "SELECT category, custom_category, status, lng, lat, created_by,
                    created_at_us, updated_at_us, version
             FROM cases WHERE case_id = ?1",
            [case_id.as_str()],
            |row| {
                Ok(Case {
                    id: case_id.clone(),
                    category: parse_column(row, 0)?,
                    custom_category: row.get(1)?,
                    status: parse_column(row, 2)?,
                    location: Point::new(row.get(3)?, row.get(4)?),
                    location_history: Vec::new(),
                    descriptions: Vec::new(),
                    photos: Vec::new(),
                    reporter_info: Vec::new(),
                    contributors: BTreeSet::new(),
                    created_by: ContributorId::new(row.get::<_, String>(5)?),
                    created_at: micros_column(row, 6)?,
                    updated_at: micros_column(row, 7)?,
                    version: version_column(row, 8)?,
                })
            },
        )
        .optional()?;
    let Some(mut case) = head else {
        return Ok(None);
    };

    let id = case_id.as_str();

    let mut stmt = conn.prepare_cached(
        "SELECT lng, lat, at_us FROM case_locations WHERE case_id = ?1 ORDER BY entry_id",
    )?;
    case.location_history = stmt
        .query_map([id], |row| {
            Ok(LocationEntry {
                point: Point::new(row.get(0)?, row.get(1)?),
                at: micros_column(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT body, contributor, at_us FROM case_descriptions
         WHERE case_id = ?1 ORDER BY entry_id",
    )?;
    case.descriptions = stmt
        .query_map([id], |row| {
            Ok(DescriptionEntry {
                text: row.get(0)?,
                contributor: ContributorId::new(row.get::<_, String>(1)?),
                at: micros_column(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT url, contributor, at_us FROM case_photos WHERE case_id = ?1 ORDER BY entry_id",
    )?;
    case.photos = stmt
        .query_map([id], |row| {
            Ok(PhotoEntry {
                url: row.get(0)?,
                contributor: ContributorId::new(row.get::<_, String>(1)?),
                at: micros_column(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT display_name, contact, color_note, contributor, custom_category, at_us
         FROM case_reporters WHERE case_id = ?1 ORDER BY entry_id",
    )?;
    case.reporter_info = stmt
        .query_map([id], |row| {
            Ok(ReporterEntry {
                display_name: row.get(0)?,
                contact: row.get(1)?,
                color_note: row.get(2)?,
                contributor: ContributorId::new(row.get::<_, String>(3)?),
                custom_category: row.get(4)?,
                at: micros_column(row, 5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt =
        conn.prepare_cached("SELECT contributor FROM case_contributors WHERE case_id = ?1")?;
    case.contributors = stmt
        .query_map([id], |row| row.get::<_, String>(0).map(ContributorId::new))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;

    Ok(Some(case))
}
