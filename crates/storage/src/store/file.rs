//! JSON-file key/value store.
//!
//! The whole namespace is loaded once when the store is opened and kept in
//! memory. Every mutation is written through to disk (to a temporary sibling
//! first, then renamed over the original) before it returns.

use super::KeyValueStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// A flat string store persisted as a single JSON object.
#[derive(Debug)]
pub struct FileStore {
    name: String,
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}
impl FileStore {
    /// Open the store at `path`, loading existing entries if the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or the file exists but
    /// cannot be read or does not hold a JSON object of strings.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!("store path `{}` is not absolute", path.display())));
        }
        let entries = match fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                ErrorKind::MalformedRecord(format!("store file `{}` is not a JSON object of strings: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(ErrorKind::Io(e).into()),
        };
        tracing::trace!(path = %path.display(), entries = entries.len(), "Opened file store");
        Ok(Self {
            name: path.display().to_string(),
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let raw = serde_json::to_vec(entries).map_err(|e| ErrorKind::BackendError(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        let temp = self.path.with_extension("tmp");
        fs::write(&temp, &raw).await.map_err(ErrorKind::Io)?;
        fs::rename(&temp, &self.path).await.map_err(ErrorKind::Io)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(err) = self.flush(&entries).await {
            // Keep memory in step with what is on disk.
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(err) = self.flush(&entries).await {
            entries.insert(key.to_string(), previous);
            return Err(err);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
