//! Canonical SQLite schema for the case store.
//!
//! The schema is normalized so that every contribution is a set of row
//! inserts rather than a rewrite of the case:
//! - `cases` keeps scalar fields, the current location and the version counter
//! - `case_descriptions`, `case_photos`, `case_reporters`, `case_locations`
//!   are ordered by their autoincrement `entry_id`
//! - `case_contributors` is a set keyed by `(case_id, contributor)`
//! - child rows cascade on case purge, detaching contributors

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS cases (
    case_id TEXT PRIMARY KEY,
    category TEXT NOT NULL CHECK (category IN ('Dog', 'Cat', 'Cow', 'Other')),
    custom_category TEXT,
    status TEXT NOT NULL DEFAULT 'Unhandled'
        CHECK (status IN ('Unhandled', 'Collected', 'InTreatment', 'Resolved')),
    lng REAL NOT NULL CHECK (lng BETWEEN -180.0 AND 180.0),
    lat REAL NOT NULL CHECK (lat BETWEEN -90.0 AND 90.0),
    created_by TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
    CHECK (custom_category IS NULL OR category = 'Other'),
    CHECK (case_id LIKE 'case-%')
);

CREATE TABLE IF NOT EXISTS case_locations (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id TEXT NOT NULL REFERENCES cases(case_id) ON DELETE CASCADE,
    lng REAL NOT NULL,
    lat REAL NOT NULL,
    at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS case_descriptions (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id TEXT NOT NULL REFERENCES cases(case_id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    contributor TEXT NOT NULL,
    at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS case_photos (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id TEXT NOT NULL REFERENCES cases(case_id) ON DELETE CASCADE,
    url TEXT NOT NULL CHECK (length(trim(url)) > 0),
    contributor TEXT NOT NULL,
    at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS case_reporters (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id TEXT NOT NULL REFERENCES cases(case_id) ON DELETE CASCADE,
    display_name TEXT NOT NULL DEFAULT '',
    contact TEXT NOT NULL DEFAULT '',
    color_note TEXT NOT NULL DEFAULT '',
    contributor TEXT NOT NULL,
    custom_category TEXT,
    at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS case_contributors (
    case_id TEXT NOT NULL REFERENCES cases(case_id) ON DELETE CASCADE,
    contributor TEXT NOT NULL CHECK (length(trim(contributor)) > 0),
    added_at_us INTEGER NOT NULL,
    PRIMARY KEY (case_id, contributor)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for dashboards, contributor views and
/// child-table scans.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_cases_status_category_created
    ON cases(status, category, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_case_contributors_contributor
    ON case_contributors(contributor, case_id);

CREATE INDEX IF NOT EXISTS idx_case_locations_case
    ON case_locations(case_id, entry_id);

CREATE INDEX IF NOT EXISTS idx_case_descriptions_case
    ON case_descriptions(case_id, entry_id);

CREATE INDEX IF NOT EXISTS idx_case_photos_case
    ON case_photos(case_id, entry_id);

CREATE INDEX IF NOT EXISTS idx_case_reporters_case
    ON case_reporters(case_id, entry_id);
";

/// Indexes expected by list/filter/load query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_cases_status_category_created",
    "idx_case_contributors_contributor",
    "idx_case_locations_case",
    "idx_case_descriptions_case",
    "idx_case_photos_case",
    "idx_case_reporters_case",
];
