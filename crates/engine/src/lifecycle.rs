//! One-time process initialization.
//!
//! The first public call on an [`Engine`](crate::Engine) probes the host's
//! storage capabilities, selects the backend and checks connectivity. The
//! outcome, success or failure, is kept for the lifetime of the engine and
//! every later call waits on the same result.

use resync_config::Config;
use resync_fetch::ConnectivityProbe;
use resync_storage::{BackendHandle, BackendKind, Capabilities, Selection, StorageHost, select_backend};
use std::fmt;

/// What initialization established.
#[derive(Clone)]
pub struct ProcessState {
    /// The backend every operation goes through.
    pub backend: BackendHandle,
    /// Which backend kinds the host offered when it was probed.
    pub capabilities: Capabilities,
    /// Whether the origin can be reached. Fixed for the process.
    pub online: bool,
}
impl ProcessState {
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }
}
impl fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessState")
            .field("backend", &self.backend.name())
            .field("capabilities", &self.capabilities)
            .field("online", &self.online)
            .finish()
    }
}

/// Result of the initialization barrier.
///
/// A failure is kept as its message: the barrier resolves once, but every
/// caller gets its own error.
pub(crate) enum Lifecycle {
    Ready(ProcessState),
    Unusable(String),
}

pub(crate) async fn initialize(
    config: &Config,
    host: &(dyn StorageHost + Send + Sync),
    connectivity: &(dyn ConnectivityProbe + Send + Sync),
) -> Lifecycle {
    let Selection { backend, capabilities } =
        match select_backend(host, config.preferred_backend, &config.namespace).await {
            Ok(selection) => selection,
            Err(err) => {
                tracing::error!(error = %err, "Storage is unavailable; the engine cannot be used");
                return Lifecycle::Unusable(err.to_string());
            },
        };

    let online = if config.check_for_updates {
        connectivity.is_reachable(config.probe_timeout()).await
    } else {
        // Nothing is verified against the origin, but cache misses still
        // have to be downloaded.
        true
    };
    if !online {
        tracing::warn!(
            timeout_ms = config.probe_timeout_ms,
            "Origin unreachable; serving cached resources only"
        );
    }

    tracing::info!(backend = backend.name(), kind = %backend.kind(), online, "Engine initialized");
    if config.debug_logging {
        tracing::debug!(
            dual = capabilities.dual,
            flat = capabilities.flat,
            preferred = %config.preferred_backend,
            namespace = %config.namespace,
            check_for_updates = config.check_for_updates,
            "Initialization details"
        );
    }

    Lifecycle::Ready(ProcessState {
        backend,
        capabilities,
        online,
    })
}
