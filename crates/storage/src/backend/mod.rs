//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait: the uniform record-level
//! contract the synchronization engine is written against. Two variants
//! implement it:
//!
//! - [`DualBackend`] keeps content and metadata in two independent binary
//!   partitions (`{namespace}_files` and `{namespace}_tags`).
//! - [`FlatBackend`] keeps two string entries per resource (`{namespace}::{url}`
//!   and `{namespace}::{url}::V`) in one shared namespace, passing content
//!   through the codec.
//!
//! Which one is active is decided once, by [`select_backend`](crate::select_backend).

mod dual;
mod flat;

pub use self::dual::DualBackend;
pub use self::flat::FlatBackend;
use crate::error::Result;
use crate::models::{CacheRecord, Fingerprint, KnownResource, ResourceType};
use async_trait::async_trait;
use derive_more::Display;
use futures::{Stream, TryStreamExt};
use resync_codec::Payload;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::str::FromStr;

pub(crate) type KnownStream<'a> = Pin<Box<dyn Stream<Item = Result<KnownResource>> + Send + 'a>>;

/// The two backend variants.
///
/// Legacy names are accepted when parsing: `cache` for dual, and `local`,
/// `localStorage` or `ls` for flat.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum BackendKind {
    #[default]
    #[display("dual")]
    Dual,
    #[display("flat")]
    Flat,
}
impl BackendKind {
    pub const ALL: [BackendKind; 2] = [Self::Dual, Self::Flat];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dual => "dual",
            Self::Flat => "flat",
        }
    }

    /// The variant to fall back to when this one is unavailable.
    pub fn other(self) -> Self {
        match self {
            Self::Dual => Self::Flat,
            Self::Flat => Self::Dual,
        }
    }
}
impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dual" | "cache" => Ok(Self::Dual),
            "flat" | "local" | "localstorage" | "ls" => Ok(Self::Flat),
            _ => Err(format!("unknown storage backend `{s}`")),
        }
    }
}
impl TryFrom<String> for BackendKind {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}
impl From<BackendKind> for &'static str {
    fn from(value: BackendKind) -> Self {
        value.as_str()
    }
}

/// Unified interface for storage backends.
///
/// Every operation is keyed by resource URL. A record only *exists* when both
/// its content entry and a well-formed metadata entry are present; anything
/// less reads back as absent (which makes the caller re-fetch) rather than as
/// an error.
///
/// Implementations are shared by every concurrently running synchronization
/// task, so each operation must be atomic from a reader's perspective:
/// [`read_record()`](Self::read_record) never observes content from one write
/// paired with the version of another.
///
/// # Examples
///
/// ```
/// use resync_storage::backend::StorageBackend;
/// use resync_storage::{Fingerprint, error::Result};
///
/// async fn is_current(backend: &dyn StorageBackend, url: &str, live: &Fingerprint) -> Result<bool> {
///     Ok(backend.read_version(url).await?.as_ref() == Some(live))
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend instance (used for logging only).
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Read the version fingerprint of the stored record, if there is a
    /// complete one.
    async fn read_version(&self, url: &str) -> Result<Option<Fingerprint>>;

    /// Read the whole stored record, if there is a complete one.
    async fn read_record(&self, url: &str) -> Result<Option<CacheRecord>>;

    /// Persist a record, replacing any prior record for the same URL.
    ///
    /// Returns the record as it was written.
    async fn write_record(
        &self,
        url: &str,
        content: Payload,
        version: Fingerprint,
        resource_type: ResourceType,
    ) -> Result<CacheRecord>;

    /// Stream every resource the backend holds a metadata entry for.
    ///
    /// Metadata entries that cannot be parsed are skipped.
    fn list_stream<'a>(&'a self) -> KnownStream<'a>;

    /// Collect the URLs from [`list_stream()`](Self::list_stream).
    async fn list_known(&self) -> Result<Vec<String>> {
        self.list_stream().map_ok(|known| known.url).try_collect().await
    }

    /// Delete everything this backend holds and reopen it empty.
    async fn purge(&self) -> Result<()>;
}
