//! Certificate file storage on the local filesystem
//!
//! Files live under `<root>/<client_id>/<uuid>_<sanitized name>`; the database
//! stores the path relative to the root.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Attempts made by [`CertificateStore::discard`] before giving up
const DISCARD_ATTEMPTS: u32 = 3;
const DISCARD_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found")]
    NotFound,

    #[error("Invalid file path")]
    InvalidPath,

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file written by [`CertificateStore::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the storage root, as persisted in `certificates.file_path`
    pub path: String,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct CertificateStore {
    root: PathBuf,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write a certificate file for `client_id`
    pub async fn save(
        &self,
        client_id: Uuid,
        original_filename: &str,
        data: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let relative = format!(
            "{}/{}_{}",
            client_id,
            Uuid::new_v4(),
            sanitize_filename(original_filename)
        );
        let path = self.resolve(&relative)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| {
                tracing::error!("Failed to create storage directory {:?}: {}", dir, e);
                e
            })?;
        }

        fs::write(&path, data).await.map_err(|e| {
            tracing::error!("Failed to write file {:?}: {} (kind: {:?})", path, e, e.kind());
            e
        })?;

        Ok(StoredFile {
            path: relative,
            size: data.len() as i64,
        })
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(relative)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a stored file, best effort
    ///
    /// Retries with a short backoff and logs a warning when the file could not
    /// be removed. Never fails: callers use it as a compensating step after the
    /// database write it belonged to was rolled back or superseded.
    pub async fn discard(&self, relative: &str) -> bool {
        let path = match self.resolve(relative) {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("Refusing to discard file outside storage root: {}", relative);
                return false;
            }
        };

        for attempt in 1..=DISCARD_ATTEMPTS {
            match fs::remove_file(&path).await {
                Ok(()) => return true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
                Err(e) if attempt < DISCARD_ATTEMPTS => {
                    tracing::debug!("Discard attempt {} for {:?} failed: {}", attempt, path, e);
                    tokio::time::sleep(DISCARD_BACKOFF * attempt).await;
                }
                Err(e) => {
                    tracing::warn!("Failed to clean up orphaned file {:?}: {}", path, e);
                }
            }
        }

        false
    }

    /// Map a relative storage path to an absolute one inside the root
    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(relative);
        let only_normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if relative.as_os_str().is_empty() || !only_normal {
            tracing::error!("Path traversal attempt detected: {:?}", relative);
            return Err(StorageError::InvalidPath);
        }

        let path = self.root.join(relative);
        if !path.starts_with(&self.root) {
            return Err(StorageError::InvalidPath);
        }
        Ok(path)
    }
}

/// Reduce an uploaded filename to a safe basename
pub fn sanitize_filename(filename: &str) -> String {
    // Strip any directory components
    let basename = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.').trim_matches('_');

    if sanitized.is_empty() {
        "certificate.pdf".to_string()
    } else {
        sanitized.to_string()
    }
}
