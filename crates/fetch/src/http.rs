//! Minimal HTTP transport boundary.
//!
//! Everything that talks to the network goes through [`HttpTransport`], so the
//! origin and connectivity logic can be tested against [`MockTransport`]
//! without sockets.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Head,
    Get,
}
impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Head => "HEAD",
            Self::Get => "GET",
        }
    }
}

/// Header names are matched case-insensitively by [`header_get`].
pub type HttpHeaders = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
}
impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}
impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// First header value matching `name` (case-insensitive).
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub type TransportHandle = Arc<dyn HttpTransport + Send + Sync>;

/// Transport boundary for all HTTP I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. Non-success statuses are returned as responses, not
    /// errors; only transport failures are errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// A real HTTP transport backed by reqwest.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}
impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client whose every request (body included) is bounded.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ErrorKind::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn map_error(err: reqwest::Error) -> ErrorKind {
        if err.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Get => reqwest::Method::GET,
        };
        let mut builder = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(Self::map_error)?;

        let status = response.status().as_u16();
        let headers: HttpHeaders = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.bytes().await.map_err(Self::map_error)?.to_vec();
        tracing::trace!(method = request.method.as_str(), url = %request.url, status, bytes = body.len(), "HTTP response");
        Ok(HttpResponse { status, headers, body })
    }
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockTransport;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    enum Reply {
        Response(HttpResponse, Option<Duration>),
        Error(ErrorKind),
    }

    #[derive(Default)]
    struct Inner {
        routes: HashMap<(HttpMethod, String), VecDeque<Reply>>,
        requests: Vec<HttpRequest>,
    }

    /// In-memory mock transport.
    ///
    /// Replies registered for the same method and URL are returned in FIFO
    /// order; a request with nothing registered fails as a transport error.
    /// Every request is recorded.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<Inner>>,
    }
    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn push(&self, method: HttpMethod, url: impl Into<String>, reply: Reply) {
            let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            inner.routes.entry((method, url.into())).or_default().push_back(reply);
        }

        pub fn push_response(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
            self.push(method, url, Reply::Response(response, None));
        }

        /// Register a response that only arrives after `delay`.
        pub fn push_delayed(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse, delay: Duration) {
            self.push(method, url, Reply::Response(response, Some(delay)));
        }

        pub fn push_error(&self, method: HttpMethod, url: impl Into<String>, error: ErrorKind) {
            self.push(method, url, Reply::Error(error));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).requests.clone()
        }

        /// Number of recorded requests with this method.
        pub fn count(&self, method: HttpMethod) -> usize {
            self.requests().iter().filter(|r| r.method == method).count()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            let reply = {
                let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let key = (request.method, request.url.clone());
                inner.requests.push(request);
                inner.routes.get_mut(&key).and_then(VecDeque::pop_front)
            };
            match reply {
                Some(Reply::Response(response, delay)) => {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(response)
                },
                Some(Reply::Error(kind)) => Err(kind.into()),
                None => exn::bail!(ErrorKind::Transport("no mock response registered".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_get_is_case_insensitive_and_returns_first_match() {
        let headers: HttpHeaders = vec![
            ("ETag".to_string(), "W/\"abc\"".to_string()),
            ("etag".to_string(), "W/\"def\"".to_string()),
        ];
        assert_eq!(header_get(&headers, "etag"), Some("W/\"abc\""));
        assert_eq!(header_get(&headers, "ETAG"), Some("W/\"abc\""));
        assert_eq!(header_get(&headers, "last-modified"), None);
    }

    #[test]
    fn response_success_range() {
        let mut response = HttpResponse {
            status: 204,
            ..Default::default()
        };
        assert!(response.is_success());
        response.status = 304;
        assert!(!response.is_success());
        response.status = 500;
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn mock_transport_replies_in_order_and_records_requests() {
        let transport = MockTransport::new();
        let url = "https://cdn.example.com/a.js";
        transport.push_response(HttpMethod::Head, url, HttpResponse {
            status: 200,
            ..Default::default()
        });
        transport.push_response(HttpMethod::Head, url, HttpResponse {
            status: 404,
            ..Default::default()
        });

        let first = transport.send(HttpRequest::new(HttpMethod::Head, url)).await.unwrap();
        let second = transport.send(HttpRequest::new(HttpMethod::Head, url)).await.unwrap();
        assert_eq!((first.status, second.status), (200, 404));
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(transport.count(HttpMethod::Get), 0);
    }

    #[tokio::test]
    async fn mock_transport_errors() {
        let transport = MockTransport::new();
        let url = "https://cdn.example.com/a.js";
        transport.push_error(HttpMethod::Get, url, ErrorKind::Transport("reset".to_string()));
        let err = transport.send(HttpRequest::new(HttpMethod::Get, url)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Transport("reset".to_string()));
        // Nothing left registered.
        assert!(transport.send(HttpRequest::new(HttpMethod::Get, url)).await.is_err());
    }

    #[test]
    fn reqwest_transport_with_timeout_builds_client() {
        assert!(ReqwestTransport::with_timeout(Duration::from_millis(1)).is_ok());
    }
}
