use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under a project root holding the case database and config.
pub const STATE_DIR: &str = ".rescue";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub photos: PhotoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_radius_meters")]
    pub radius_meters: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            radius_meters: default_radius_meters(),
            max_candidates: default_max_candidates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_timeout_ms(),
            busy_timeout_ms: default_timeout_ms(),
            conflict_retries: default_conflict_retries(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoConfig {
    #[serde(default = "default_max_photo_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_content_type_prefix")]
    pub content_type_prefix: String,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_photo_bytes(),
            content_type_prefix: default_content_type_prefix(),
        }
    }
}

/// Load `<root>/.rescue/config.toml`, else the per-user config, else
/// defaults.
///
/// # Errors
///
/// Returns an error if the chosen file exists but cannot be read or parsed.
pub fn load_config(project_root: &Path) -> Result<EngineConfig> {
    load_config_from(project_root, user_config_path().as_deref())
}

/// Per-user config location (`~/.config/rescue/config.toml` on Linux).
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rescue").join("config.toml"))
}

/// [`load_config`] with an explicit user config location. The project file
/// wins outright; the two are not merged.
///
/// # Errors
///
/// Returns an error if the chosen file exists but cannot be read or parsed.
pub fn load_config_from(project_root: &Path, user_config: Option<&Path>) -> Result<EngineConfig> {
    let project = project_root.join(STATE_DIR).join("config.toml");
    let path = if project.exists() {
        project
    } else if let Some(user) = user_config.filter(|path| path.exists()) {
        user.to_path_buf()
    } else {
        return Ok(EngineConfig::default());
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Default case database location for a project root.
#[must_use]
pub fn default_db_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join("cases.sqlite3")
}

const fn default_radius_meters() -> f64 {
    5_000.0
}

const fn default_max_candidates() -> usize {
    5
}

const fn default_timeout_ms() -> u64 {
    5_000
}

const fn default_conflict_retries() -> u32 {
    3
}

const fn default_max_photo_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_content_type_prefix() -> String {
    "image/".to_string()
}
