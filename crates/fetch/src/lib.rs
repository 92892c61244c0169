//! Everything the engine needs from the network.
//!
//! - [`Origin`] resolves a resource's live [`Fingerprint`](resync_storage::Fingerprint)
//!   with a metadata-only probe, and downloads full content.
//! - [`ConnectivityProbe`] answers, once, whether the network is usable.
//!
//! Both sit on the [`HttpTransport`] boundary.

pub mod connectivity;
pub mod error;
pub mod http;
mod origin;

pub use crate::connectivity::{ConnectivityHandle, ConnectivityProbe, HttpConnectivityProbe, StaticConnectivity};
pub use crate::http::{HttpTransport, ReqwestTransport, TransportHandle};
#[cfg(any(test, feature = "mock"))]
pub use crate::http::MockTransport;
pub use crate::origin::{Download, HttpOrigin, Origin, OriginHandle, response_fingerprint};
