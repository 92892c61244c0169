//! Storage hosts and backend selection.
//!
//! A [`StorageHost`] is whatever environment provides the raw stores: it
//! answers whether each backend kind can be used at all, and opens a backend
//! of that kind for a namespace. Selection happens once per process through
//! [`select_backend`].

use crate::backend::{BackendKind, DualBackend, FlatBackend};
use crate::error::{ErrorKind, Result};
use crate::key::validate_namespace;
use crate::store::{DirPartition, FileStore, StoreHandle};
use crate::BackendHandle;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// File name of the flat store inside a [`LocalHost`] root.
pub const FLAT_STORE_FILE: &str = "flat-store.json";

pub type HostHandle = Arc<dyn StorageHost + Send + Sync>;

/// Environment providing the raw stores behind each backend kind.
#[async_trait]
pub trait StorageHost: Send + Sync {
    /// Whether a backend of this kind can be opened on this host.
    fn supports(&self, kind: BackendKind) -> bool;

    /// Open a backend of the given kind for `namespace`.
    ///
    /// Opening the same kind and namespace twice must give two views of the
    /// same underlying data.
    async fn open(&self, kind: BackendKind, namespace: &str) -> Result<BackendHandle>;
}

/// Result of probing a host for each backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub dual: bool,
    pub flat: bool,
}
impl Capabilities {
    pub fn probe(host: &(dyn StorageHost + Send + Sync)) -> Self {
        Self {
            dual: host.supports(BackendKind::Dual),
            flat: host.supports(BackendKind::Flat),
        }
    }

    pub fn supports(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Dual => self.dual,
            BackendKind::Flat => self.flat,
        }
    }

    /// The preferred kind if it is available, otherwise the other one if
    /// that is, otherwise nothing.
    pub fn choose(&self, preferred: BackendKind) -> Option<BackendKind> {
        [preferred, preferred.other()].into_iter().find(|kind| self.supports(*kind))
    }

    pub fn supported(&self) -> impl Iterator<Item = BackendKind> + '_ {
        BackendKind::ALL.into_iter().filter(|kind| self.supports(*kind))
    }
}

/// The backend chosen for the process, and what the host offered.
pub struct Selection {
    pub backend: BackendHandle,
    pub capabilities: Capabilities,
}

/// Probe the host and open the backend to use for the process lifetime.
///
/// # Errors
///
/// Returns [`Unavailable`](ErrorKind::Unavailable) when the host supports
/// neither backend kind, or the error from opening the chosen one.
pub async fn select_backend(
    host: &(dyn StorageHost + Send + Sync),
    preferred: BackendKind,
    namespace: &str,
) -> Result<Selection> {
    let capabilities = Capabilities::probe(host);
    let Some(kind) = capabilities.choose(preferred) else {
        tracing::error!(preferred = %preferred, "No storage backend is available on this host");
        exn::bail!(ErrorKind::Unavailable(preferred));
    };
    if kind != preferred {
        tracing::warn!(preferred = %preferred, fallback = %kind, "Preferred storage backend unavailable, falling back");
    }
    let backend = host.open(kind, namespace).await?;
    Ok(Selection { backend, capabilities })
}

/// Host backed by a directory on the local filesystem.
///
/// The dual backend gets two sub-directories per namespace
/// (`{namespace}_files`, `{namespace}_tags`); the flat backend shares a single
/// JSON file ([`FLAT_STORE_FILE`]) between all namespaces.
///
/// # Examples
///
/// ```no_run
/// use resync_storage::{BackendKind, LocalHost, select_backend};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let host = LocalHost::new("/var/cache/my-app")?;
/// let selected = select_backend(&host, BackendKind::Dual, "quiche").await?;
/// println!("using the {} backend", selected.backend.kind());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalHost {
    root: PathBuf,
    flat: OnceCell<Arc<FileStore>>,
}
impl LocalHost {
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!("storage root `{}` is not absolute", root.display())));
        }
        Ok(Self {
            root,
            flat: OnceCell::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn writable_root(&self) -> bool {
        if std::fs::create_dir_all(&self.root).is_err() {
            return false;
        }
        std::fs::metadata(&self.root).is_ok_and(|m| m.is_dir() && !m.permissions().readonly())
    }

    async fn flat_store(&self) -> Result<StoreHandle> {
        let store = self
            .flat
            .get_or_try_init(|| async { FileStore::open(self.root.join(FLAT_STORE_FILE)).await.map(Arc::new) })
            .await?;
        let store: StoreHandle = store.clone();
        Ok(store)
    }
}

#[async_trait]
impl StorageHost for LocalHost {
    fn supports(&self, kind: BackendKind) -> bool {
        let supported = self.writable_root();
        tracing::trace!(root = %self.root.display(), kind = %kind, supported, "Probed storage capability");
        supported
    }

    async fn open(&self, kind: BackendKind, namespace: &str) -> Result<BackendHandle> {
        let namespace = validate_namespace(namespace)?;
        let backend: BackendHandle = match kind {
            BackendKind::Dual => {
                let files = format!("{namespace}_files");
                let tags = format!("{namespace}_tags");
                let files = DirPartition::new(&files, self.root.join(&files))?;
                let tags = DirPartition::new(&tags, self.root.join(&tags))?;
                Arc::new(DualBackend::new(namespace, Arc::new(files), Arc::new(tags)))
            },
            BackendKind::Flat => Arc::new(FlatBackend::new(namespace, self.flat_store().await?)),
        };
        Ok(backend)
    }
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockHost;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use crate::store::{MemoryPartition, MemoryStore};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory host for testing.
    ///
    /// Which backend kinds it claims to support is configurable, so tests can
    /// exercise fallback and the no-backend failure. Backends opened from the
    /// same host share their data.
    #[derive(Debug)]
    pub struct MockHost {
        dual: bool,
        flat: bool,
        partitions: Mutex<HashMap<String, Arc<MemoryPartition>>>,
        store: Arc<MemoryStore>,
    }
    impl MockHost {
        pub fn new() -> Self {
            Self::with_support(true, true)
        }

        pub fn with_support(dual: bool, flat: bool) -> Self {
            Self {
                dual,
                flat,
                partitions: Mutex::new(HashMap::new()),
                store: Arc::new(MemoryStore::new()),
            }
        }

        /// The partition with this name, created empty on first use.
        pub fn partition(&self, name: &str) -> Arc<MemoryPartition> {
            let mut partitions = self.partitions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            partitions
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryPartition::new(name)))
                .clone()
        }

        /// The string store every flat backend opened from this host uses.
        pub fn store(&self) -> Arc<MemoryStore> {
            self.store.clone()
        }
    }
    impl Default for MockHost {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl StorageHost for MockHost {
        fn supports(&self, kind: BackendKind) -> bool {
            match kind {
                BackendKind::Dual => self.dual,
                BackendKind::Flat => self.flat,
            }
        }

        async fn open(&self, kind: BackendKind, namespace: &str) -> Result<BackendHandle> {
            let namespace = validate_namespace(namespace)?;
            if !self.supports(kind) {
                exn::bail!(ErrorKind::Unavailable(kind));
            }
            let backend: BackendHandle = match kind {
                BackendKind::Dual => Arc::new(DualBackend::new(
                    namespace,
                    self.partition(&format!("{namespace}_files")),
                    self.partition(&format!("{namespace}_tags")),
                )),
                BackendKind::Flat => Arc::new(FlatBackend::new(namespace, self.store.clone())),
            };
            Ok(backend)
        }
    }
}
