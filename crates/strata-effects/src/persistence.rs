//! File persistence of the query table
//!
//! The query table is written as `{ compositeKey -> QueryEntry }` JSON,
//! optionally encrypted. Writes go to a sibling temp file first and are then
//! renamed over the target.

use std::path::{Path, PathBuf};

use strata_core::{ApiConfig, ResultStore, Result, StrataError};
use tokio::fs;

use crate::encryption::{decrypt_bytes, encrypt_bytes};

/// Saves and restores the query table of a [`ResultStore`].
#[derive(Debug, Clone)]
pub struct QueryPersistence {
    path: PathBuf,
    secret: Option<String>,
}

impl QueryPersistence {
    /// Plain JSON at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            secret: None,
        }
    }

    /// Encrypt with `secret`.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// At `path`, encrypted when the config enables it.
    pub fn from_config(path: impl Into<PathBuf>, config: &ApiConfig) -> Self {
        let persistence = Self::new(path);
        match config.encryption_key() {
            Some(secret) => persistence.with_secret(secret),
            None => persistence,
        }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the query table.
    pub async fn save(&self, store: &ResultStore) -> Result<()> {
        let json = store.export_queries()?;
        let contents = match &self.secret {
            Some(secret) => encrypt_bytes(json.as_bytes(), secret)?,
            None => json,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                StrataError::storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents.as_bytes()).await.map_err(|e| {
            StrataError::storage(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            StrataError::storage(format!("Failed to replace {}: {e}", self.path.display()))
        })?;

        tracing::debug!(path = %self.path.display(), encrypted = self.secret.is_some(), "query table saved");
        Ok(())
    }

    /// Restore the query table. A missing file restores nothing.
    pub async fn load(&self, store: &ResultStore) -> Result<usize> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StrataError::storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let json = match &self.secret {
            Some(secret) => String::from_utf8(decrypt_bytes(&contents, secret)?)
                .map_err(|e| StrataError::serialization(e.to_string()))?,
            None => contents,
        };
        store.hydrate_queries(&json)
    }
}
