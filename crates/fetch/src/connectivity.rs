//! Single boolean liveness check, run once per process.

use crate::http::{HttpMethod, HttpRequest, TransportHandle};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type ConnectivityHandle = Arc<dyn ConnectivityProbe + Send + Sync>;

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the network is usable, answered within `timeout`. Any failure
    /// to answer counts as unreachable.
    async fn is_reachable(&self, timeout: Duration) -> bool;
}

/// Probe that sends a `HEAD` request to a fixed endpoint (normally one that
/// answers `204 No Content`).
pub struct HttpConnectivityProbe {
    transport: TransportHandle,
    url: String,
}
impl HttpConnectivityProbe {
    pub fn new(transport: TransportHandle, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_reachable(&self, timeout: Duration) -> bool {
        let request = HttpRequest::new(HttpMethod::Head, &self.url);
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response.is_success(),
            Ok(Err(err)) => {
                tracing::debug!(url = %self.url, error = %err, "Connectivity probe failed");
                false
            },
            Err(_elapsed) => {
                tracing::debug!(url = %self.url, timeout_ms = timeout.as_millis(), "Connectivity probe timed out");
                false
            },
        }
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticConnectivity(pub bool);

#[async_trait]
impl ConnectivityProbe for StaticConnectivity {
    async fn is_reachable(&self, _timeout: Duration) -> bool {
        self.0
    }
}
