//! Dual-namespace storage backend.
//!
//! Content lives in one partition (`{namespace}_files`) and metadata in
//! another (`{namespace}_tags`), both keyed by URL. Binary content is stored
//! as-is; nothing passes through the string codec.
//!
//! A tag records the content's encoding and a BLAKE3 checksum next to the
//! type and version. Writes remove the old tag, store the content, then store
//! the new tag, so an interrupted write leaves no tag (absent) rather than a
//! tag describing different content. Reads verify the checksum as well.

use super::{BackendKind, KnownStream, StorageBackend};
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::models::{CacheRecord, Fingerprint, KnownResource, ResourceType};
use crate::store::PartitionHandle;
use async_stream::stream;
use async_trait::async_trait;
use resync_codec::{Blob, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    Text,
    Structured,
    Blob,
}

/// Metadata entry as stored in the tags partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tag {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    #[serde(rename = "ver")]
    version: Fingerprint,
    enc: Encoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime: Option<String>,
    sum: String,
}
impl Tag {
    fn parse(raw: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(raw).ok().filter(|tag| !tag.version.is_empty())
    }

    fn checksum(data: &[u8]) -> String {
        blake3::hash(data).to_string()
    }
}

/// Split a payload into the bytes stored in the files partition, plus how to
/// reassemble it.
fn flatten(content: &Payload) -> Result<(Encoding, Option<String>, Vec<u8>)> {
    Ok(match content {
        Payload::Text(text) => (Encoding::Text, None, text.as_bytes().to_vec()),
        Payload::Structured(value) => {
            let raw = serde_json::to_vec(value).map_err(|e| ErrorKind::BackendError(e.to_string()))?;
            (Encoding::Structured, None, raw)
        },
        Payload::Blob(blob) => (Encoding::Blob, Some(blob.mime_type.clone()), blob.bytes.clone()),
    })
}

fn inflate(tag: &Tag, data: Vec<u8>) -> Option<Payload> {
    match tag.enc {
        Encoding::Text => String::from_utf8(data).ok().map(Payload::Text),
        Encoding::Structured => serde_json::from_slice::<Value>(&data).ok().map(Payload::Structured),
        Encoding::Blob => Some(Payload::Blob(Blob::new(tag.mime.clone().unwrap_or_default(), data))),
    }
}

/// Storage backend over two binary-capable partitions.
///
/// # Examples
///
/// ```
/// use resync_storage::backend::{DualBackend, StorageBackend};
/// use resync_storage::store::MemoryPartition;
/// use resync_storage::{Fingerprint, ResourceType};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = DualBackend::new(
///     "quiche",
///     Arc::new(MemoryPartition::new("quiche_files")),
///     Arc::new(MemoryPartition::new("quiche_tags")),
/// );
/// backend.write_record("a.js", "console.log(1)".into(), Fingerprint::from("h1"), ResourceType::Script).await?;
/// assert_eq!(backend.read_version("a.js").await?, Some(Fingerprint::from("h1")));
/// # Ok(())
/// # }
/// ```
pub struct DualBackend {
    name: String,
    files: PartitionHandle,
    tags: PartitionHandle,
    /// Writers hold this exclusively for the whole content+tag sequence.
    gate: RwLock<()>,
}
impl DualBackend {
    pub fn new(name: impl Into<String>, files: PartitionHandle, tags: PartitionHandle) -> Self {
        Self {
            name: name.into(),
            files,
            tags,
            gate: RwLock::new(()),
        }
    }

    async fn read_tag(&self, url: &str) -> Result<Option<Tag>> {
        let Some(raw) = self.tags.get(url).await? else {
            return Ok(None);
        };
        let tag = Tag::parse(&raw);
        if tag.is_none() {
            tracing::warn!(backend = %self.name, url, "Ignoring malformed tag entry");
        }
        Ok(tag)
    }
}

#[async_trait]
impl StorageBackend for DualBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Dual
    }

    async fn read_version(&self, url: &str) -> Result<Option<Fingerprint>> {
        validate_key(url)?;
        let _guard = self.gate.read().await;
        let Some(tag) = self.read_tag(url).await? else {
            return Ok(None);
        };
        if !self.files.contains(url).await? {
            return Ok(None);
        }
        Ok(Some(tag.version))
    }

    async fn read_record(&self, url: &str) -> Result<Option<CacheRecord>> {
        validate_key(url)?;
        let _guard = self.gate.read().await;
        let Some(tag) = self.read_tag(url).await? else {
            return Ok(None);
        };
        let Some(data) = self.files.get(url).await? else {
            return Ok(None);
        };
        if Tag::checksum(&data) != tag.sum {
            tracing::warn!(backend = %self.name, url, "Stored content does not match its tag checksum");
            return Ok(None);
        }
        let Some(content) = inflate(&tag, data) else {
            tracing::warn!(backend = %self.name, url, encoding = ?tag.enc, "Stored content cannot be decoded");
            return Ok(None);
        };
        Ok(Some(CacheRecord {
            content,
            resource_type: tag.resource_type,
            version: tag.version,
        }))
    }

    async fn write_record(
        &self,
        url: &str,
        content: Payload,
        version: Fingerprint,
        resource_type: ResourceType,
    ) -> Result<CacheRecord> {
        validate_key(url)?;
        if version.is_empty() {
            exn::bail!(ErrorKind::MalformedRecord(format!("refusing to store `{url}` without a version")));
        }
        let (enc, mime, data) = flatten(&content)?;
        let tag = Tag {
            resource_type,
            version: version.clone(),
            enc,
            mime,
            sum: Tag::checksum(&data),
        };
        let raw_tag = serde_json::to_vec(&tag).map_err(|e| ErrorKind::BackendError(e.to_string()))?;

        let _guard = self.gate.write().await;
        self.tags.remove(url).await?;
        self.files.put(url, &data).await?;
        self.tags.put(url, &raw_tag).await?;
        tracing::trace!(backend = %self.name, url, version = %version, bytes = data.len(), "Wrote record");
        Ok(CacheRecord {
            content,
            resource_type,
            version,
        })
    }

    fn list_stream<'a>(&'a self) -> KnownStream<'a> {
        Box::pin(stream! {
            // Snapshot the keys first; the tags are read one at a time after.
            let keys = {
                let _guard = self.gate.read().await;
                self.tags.keys().await
            };
            let keys = match keys {
                Ok(keys) => keys,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for url in keys {
                let tag = {
                    let _guard = self.gate.read().await;
                    self.read_tag(&url).await
                };
                match tag {
                    Ok(Some(tag)) => yield Ok(KnownResource {
                        url,
                        resource_type: tag.resource_type,
                        version: tag.version,
                    }),
                    // Removed or malformed since the snapshot.
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn purge(&self) -> Result<()> {
        let _guard = self.gate.write().await;
        self.tags.reset().await?;
        self.files.reset().await?;
        tracing::debug!(backend = %self.name, files = self.files.name(), tags = self.tags.name(), "Purged partitions");
        Ok(())
    }
}
