//! Raw keyed stores the backends are built on.
//!
//! Two shapes of host storage exist, mirroring what the two backend variants
//! need:
//!
//! - a [`Partition`] is one named, binary-capable keyed store. The dual
//!   backend uses two of them (`{namespace}_files` and `{namespace}_tags`).
//! - a [`KeyValueStore`] is a single flat namespace that can only hold
//!   strings. The flat backend shares one with anything else on the host,
//!   so it prefixes every key with its own namespace.
//!
//! Neither trait knows anything about records, versions or codecs.

mod dir;
mod file;
mod memory;

pub use self::dir::DirPartition;
pub use self::file::FileStore;
pub use self::memory::{MemoryPartition, MemoryStore};
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;

pub(crate) type KeyStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

pub type PartitionHandle = Arc<dyn Partition + Send + Sync>;
pub type StoreHandle = Arc<dyn KeyValueStore + Send + Sync>;

/// A named keyed store holding arbitrary bytes.
#[async_trait]
pub trait Partition: Send + Sync {
    /// Name of the partition (`{namespace}_files`, `{namespace}_tags`); used
    /// for logging only.
    fn name(&self) -> &str;

    /// Read the entry stored under `key`, `None` if there isn't one.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Check whether an entry exists without reading it.
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Create or replace the entry stored under `key`.
    ///
    /// Implementations must never leave a half-written entry visible: a
    /// reader sees either the previous entry or the new one.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove the entry stored under `key`. Removing a missing entry is not
    /// an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Stream every key currently held.
    fn keys_stream<'a>(&'a self) -> KeyStream<'a>;

    /// Collect [`keys_stream()`](Self::keys_stream) into a [`Vec`].
    async fn keys(&self) -> Result<Vec<String>> {
        self.keys_stream().try_collect().await
    }

    /// Delete the whole partition and reopen it empty.
    async fn reset(&self) -> Result<()>;
}

/// A flat, string-only key/value namespace.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Every key currently held, in no particular order.
    async fn keys(&self) -> Result<Vec<String>>;
}
