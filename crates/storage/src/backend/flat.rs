//! Flat string-only storage backend.
//!
//! Every resource is two string entries in one shared namespace:
//!
//! | key                      | value                              |
//! |--------------------------|------------------------------------|
//! | `{namespace}::{url}`     | content, through [`resync_codec`]  |
//! | `{namespace}::{url}::V`  | `{"type": ..., "ver": ...}`        |

use super::{BackendKind, KnownStream, StorageBackend};
use crate::error::{ErrorKind, Result};
use crate::key::{self, validate as validate_key};
use crate::models::{CacheRecord, Fingerprint, KnownResource, ResourceType, StoredMeta};
use crate::store::StoreHandle;
use async_stream::stream;
use async_trait::async_trait;
use resync_codec::Payload;
use tokio::sync::RwLock;

/// Storage backend over a single string key/value store.
pub struct FlatBackend {
    namespace: String,
    store: StoreHandle,
    /// Writers hold this exclusively for the whole content+meta sequence.
    gate: RwLock<()>,
}
impl FlatBackend {
    pub fn new(namespace: impl Into<String>, store: StoreHandle) -> Self {
        Self {
            namespace: namespace.into(),
            store,
            gate: RwLock::new(()),
        }
    }

    async fn read_meta(&self, url: &str) -> Result<Option<StoredMeta>> {
        let Some(raw) = self.store.get_item(&key::meta_key(&self.namespace, url)).await? else {
            return Ok(None);
        };
        let meta = StoredMeta::parse(raw.as_bytes());
        if meta.is_none() {
            tracing::warn!(backend = %self.namespace, url, "Ignoring malformed metadata entry");
        }
        Ok(meta)
    }
}

#[async_trait]
impl StorageBackend for FlatBackend {
    fn name(&self) -> &str {
        &self.namespace
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Flat
    }

    async fn read_version(&self, url: &str) -> Result<Option<Fingerprint>> {
        validate_key(url)?;
        let _guard = self.gate.read().await;
        let Some(meta) = self.read_meta(url).await? else {
            return Ok(None);
        };
        let content = self.store.get_item(&key::content_key(&self.namespace, url)).await?;
        Ok(content.map(|_| meta.version))
    }

    async fn read_record(&self, url: &str) -> Result<Option<CacheRecord>> {
        validate_key(url)?;
        let _guard = self.gate.read().await;
        let Some(meta) = self.read_meta(url).await? else {
            return Ok(None);
        };
        let Some(encoded) = self.store.get_item(&key::content_key(&self.namespace, url)).await? else {
            return Ok(None);
        };
        let content = match resync_codec::decode(&encoded) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(backend = %self.namespace, url, error = %err, "Stored content cannot be decoded");
                return Ok(None);
            },
        };
        Ok(Some(CacheRecord {
            content,
            resource_type: meta.resource_type,
            version: meta.version,
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
        // Encode before touching the store, so a payload that cannot be
        // encoded leaves the previous record intact.
        let encoded = resync_codec::encode(&content).map_err(ErrorKind::codec)?;
        let meta = StoredMeta {
            resource_type,
            version: version.clone(),
        };
        let raw_meta = serde_json::to_string(&meta).map_err(|e| ErrorKind::BackendError(e.to_string()))?;
        let content_key = key::content_key(&self.namespace, url);
        let meta_key = key::meta_key(&self.namespace, url);

        let _guard = self.gate.write().await;
        self.store.remove_item(&meta_key).await?;
        self.store.set_item(&content_key, &encoded).await?;
        self.store.set_item(&meta_key, &raw_meta).await?;
        tracing::trace!(backend = %self.namespace, url, version = %version, chars = encoded.len(), "Wrote record");
        Ok(CacheRecord {
            content,
            resource_type,
            version,
        })
    }

    fn list_stream<'a>(&'a self) -> KnownStream<'a> {
        Box::pin(stream! {
            let keys = {
                let _guard = self.gate.read().await;
                self.store.keys().await
            };
            let keys = match keys {
                Ok(keys) => keys,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let urls: Vec<String> = keys
                .iter()
                .filter_map(|k| key::url_from_meta_key(&self.namespace, k))
                .map(str::to_string)
                .collect();
            for url in urls {
                let meta = {
                    let _guard = self.gate.read().await;
                    self.read_meta(&url).await
                };
                match meta {
                    Ok(Some(meta)) => yield Ok(KnownResource {
                        url,
                        resource_type: meta.resource_type,
                        version: meta.version,
                    }),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn purge(&self) -> Result<()> {
        let _guard = self.gate.write().await;
        let prefix = key::namespace_prefix(&self.namespace);
        let mut removed = 0usize;
        for k in self.store.keys().await? {
            if k.starts_with(&prefix) {
                self.store.remove_item(&k).await?;
                removed += 1;
            }
        }
        tracing::debug!(backend = %self.namespace, store = self.store.name(), removed, "Purged namespace");
        Ok(())
    }
}
