//! Photo storage seam.
//!
//! The engine never keeps photo bytes. Uploads are handed to a [`BlobStore`]
//! and only the returned URL is recorded on the case.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::config::PhotoConfig;
use crate::error::EngineError;

/// Errors returned by a blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob store rejected upload: {0}")]
    Rejected(String),
}

impl From<BlobError> for EngineError {
    fn from(err: BlobError) -> Self {
        Self::Upstream {
            service: "blob storage",
            message: err.to_string(),
        }
    }
}

/// External object store that returns a stable URL for uploaded bytes.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return the URL they can be fetched from.
    ///
    /// # Errors
    ///
    /// Returns a [`BlobError`] when the upload does not complete.
    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, BlobError>;
}

/// Reject uploads that are too large or are not images.
///
/// # Errors
///
/// Returns a validation error on field `photo`.
pub fn validate_upload(
    bytes: &[u8],
    content_type: &str,
    config: &PhotoConfig,
) -> Result<(), EngineError> {
    if bytes.is_empty() {
        return Err(EngineError::validation("photo", "upload is empty"));
    }
    if bytes.len() > config.max_bytes {
        return Err(EngineError::validation(
            "photo",
            format!(
                "upload is {} bytes, limit is {}",
                bytes.len(),
                config.max_bytes
            ),
        ));
    }
    let content_type = content_type.trim().to_ascii_lowercase();
    if !content_type.starts_with(&config.content_type_prefix) {
        return Err(EngineError::validation(
            "photo",
            format!(
                "content type '{content_type}' is not {}*",
                config.content_type_prefix
            ),
        ));
    }
    Ok(())
}

/// Filesystem blob store writing content-addressed files under a directory.
///
/// Identical bytes map to the same file, so re-uploads are free.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn extension(content_type: &str) -> &'static str {
        match content_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/heic" => "heic",
            _ => "bin",
        }
    }
}

impl BlobStore for DirBlobStore {
    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, BlobError> {
        let hex = blake3::hash(bytes).to_hex();
        let shard = self.root.join(&hex[..2]);
        std::fs::create_dir_all(&shard)?;

        let path = shard.join(format!("{hex}.{}", Self::extension(content_type)));
        if !path.exists() {
            let tmp = shard.join(format!(".{hex}.tmp"));
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp, &path)?;
        }

        let absolute = std::fs::canonicalize(&path)?;
        Ok(format!("file://{}", absolute.display()))
    }
}
