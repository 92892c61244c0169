//! In-memory stores.
//!
//! Nothing survives the process; useful for hosts without a writable
//! filesystem, and for tests.

use super::{KeyStream, KeyValueStore, Partition};
use crate::error::{ErrorKind, Result};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory partition.
///
/// Writes can be made to fail with [`fail_writes()`](Self::fail_writes) to
/// exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryPartition {
    name: String,
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}
impl MemoryPartition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Make every subsequent `put` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Partition for MemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        crate::key::validate(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        crate::key::validate(key)?;
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        crate::key::validate(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("{} refused write", self.name)));
        }
        self.entries.write().await.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    fn keys_stream<'a>(&'a self) -> KeyStream<'a> {
        Box::pin(stream! {
            // Snapshot, then drop the lock before yielding.
            let keys: Vec<String> = {
                let entries = self.entries.read().await;
                entries.keys().cloned().collect()
            };
            for key in keys {
                yield Ok(key);
            }
        })
    }

    async fn reset(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// In-memory flat string store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set_item` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("memory store refused write to {key}")));
        }
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
