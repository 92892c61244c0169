//! Remote origin access: cheap fingerprint probes and full downloads.

use crate::error::{ErrorKind, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, TransportHandle};
use async_trait::async_trait;
use resync_codec::{Blob, Payload};
use resync_storage::{Fingerprint, ResourceType};
use std::sync::Arc;
use std::time::Duration;

pub const LAST_MODIFIED: &str = "Last-Modified";
pub const ETAG: &str = "ETag";
pub const CONTENT_TYPE: &str = "Content-Type";

/// A downloaded resource, with the fingerprint of the response it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub fingerprint: Fingerprint,
    pub content: Payload,
}
impl Download {
    /// A download with no fingerprint or no body must never be stored.
    pub fn is_usable(&self) -> bool {
        !self.fingerprint.is_empty() && !self.content.is_empty()
    }
}

/// Fingerprint of a response, from its `Last-Modified` and `ETag` headers.
pub fn response_fingerprint(response: &HttpResponse) -> Fingerprint {
    Fingerprint::derive(response.header(LAST_MODIFIED), response.header(ETAG))
}

pub type OriginHandle = Arc<dyn Origin + Send + Sync>;

/// Where resources come from.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Resolve the live fingerprint of `url` without transferring its body.
    async fn fingerprint(&self, url: &str) -> Result<Fingerprint>;

    /// Download the full resource, decoded as `resource_type` requires.
    async fn download(&self, url: &str, resource_type: ResourceType) -> Result<Download>;
}

/// Origin reached over HTTP.
///
/// Fingerprints come from a `HEAD` request bounded by the probe timeout;
/// downloads are a plain `GET` bounded by the download timeout.
pub struct HttpOrigin {
    transport: TransportHandle,
    probe_timeout: Duration,
    download_timeout: Duration,
}
impl HttpOrigin {
    pub fn new(transport: TransportHandle, probe_timeout: Duration, download_timeout: Duration) -> Self {
        Self {
            transport,
            probe_timeout,
            download_timeout,
        }
    }

    fn decode_body(url: &str, resource_type: ResourceType, response: HttpResponse) -> Result<Payload> {
        if resource_type.is_binary() {
            let mime_type = response.header(CONTENT_TYPE).unwrap_or_default().to_string();
            return Ok(Payload::Blob(Blob::new(mime_type, response.body)));
        }
        match String::from_utf8(response.body) {
            Ok(text) => Ok(Payload::Text(text)),
            Err(e) => exn::bail!(ErrorKind::InvalidBody(format!("{url} is not valid UTF-8: {e}"))),
        }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fingerprint(&self, url: &str) -> Result<Fingerprint> {
        let request = HttpRequest::new(HttpMethod::Head, url);
        let response = match tokio::time::timeout(self.probe_timeout, self.transport.send(request)).await {
            Ok(response) => response?,
            Err(_elapsed) => exn::bail!(ErrorKind::Timeout),
        };
        if !response.is_success() {
            exn::bail!(ErrorKind::Status(response.status));
        }
        Ok(response_fingerprint(&response))
    }

    async fn download(&self, url: &str, resource_type: ResourceType) -> Result<Download> {
        let request = HttpRequest::new(HttpMethod::Get, url);
        let response = match tokio::time::timeout(self.download_timeout, self.transport.send(request)).await {
            Ok(response) => response?,
            Err(_elapsed) => exn::bail!(ErrorKind::Timeout),
        };
        if !response.is_success() {
            exn::bail!(ErrorKind::Status(response.status));
        }
        let fingerprint = response_fingerprint(&response);
        let content = Self::decode_body(url, resource_type, response)?;
        Ok(Download { fingerprint, content })
    }
}
