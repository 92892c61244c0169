//! Persistence for synchronized resources.
//!
//! Every resource is stored as a [`CacheRecord`]: its content, its
//! [`ResourceType`] and the [`Fingerprint`] of the remote version it came
//! from. Records are read and written through a [`StorageBackend`], of which
//! there are two interchangeable variants (see [`backend`]). The host decides
//! which variants are available; [`select_backend`] picks one once per
//! process.

pub mod backend;
pub mod error;
mod host;
mod key;
mod models;
pub mod store;

pub use crate::backend::{BackendKind, StorageBackend};
pub use crate::error::ErrorKind;
#[cfg(any(test, feature = "mock"))]
pub use crate::host::MockHost;
pub use crate::host::{Capabilities, FLAT_STORE_FILE, HostHandle, LocalHost, Selection, StorageHost, select_backend};
pub use crate::key::{validate as validate_key, validate_namespace};
pub use crate::models::{CacheRecord, Fingerprint, KnownResource, ResourceType, StoredMeta};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
