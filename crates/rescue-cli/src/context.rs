//! Opening the engine for a CLI invocation.

use anyhow::Context as _;
use rescue_core::Engine;
use rescue_core::blob::DirBlobStore;
use rescue_core::config::{self, STATE_DIR};
use rescue_core::db::SqliteCaseStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Database path: explicit `--db`, else the project's `.rescue/cases.sqlite3`.
pub fn resolve_db_path(db_flag: Option<&Path>, project_root: &Path) -> PathBuf {
    db_flag.map_or_else(|| config::default_db_path(project_root), Path::to_path_buf)
}

/// Photos are stored next to the database they belong to.
fn photo_root(db_path: &Path, project_root: &Path) -> PathBuf {
    db_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| project_root.join(STATE_DIR), Path::to_path_buf)
        .join("photos")
}

/// Load config, open the case database and build the engine.
pub fn open_engine(db_flag: Option<&Path>, project_root: &Path) -> anyhow::Result<Engine> {
    let config = config::load_config(project_root)?;
    let db_path = resolve_db_path(db_flag, project_root);
    let store = SqliteCaseStore::open(&db_path, config.store.busy_timeout())
        .with_context(|| format!("failed to open case database {}", db_path.display()))?;
    let blobs = DirBlobStore::new(photo_root(&db_path, project_root));
    debug!(db = %db_path.display(), photos = %blobs.root().display(), "opening engine");

    Ok(Engine::open(Arc::new(store), Arc::new(blobs), config)?)
}
