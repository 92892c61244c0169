//! Engine Error Types
//!
//! Lower crates' errors are kept as children in the error tree; the kinds
//! here only say which part of a synchronization failed.

use crate::descriptor::Rejection;
use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an engine failure.
///
/// ### Fatal
/// - [`ErrorKind::Capability`]: the engine cannot be used at all.
///
/// ### Per-resource
/// - [`ErrorKind::Storage`], [`ErrorKind::Fetch`]: dependency errors.
/// - [`ErrorKind::Offline`]: a download was needed but the device is offline.
/// - [`ErrorKind::EmptyDownload`]: the origin answered without a usable body
///   or fingerprint; nothing was stored.
/// - [`ErrorKind::Invalid`]: the descriptor was rejected before any work.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No storage backend could be selected during initialization.
    #[display("no usable storage backend: {_0}")]
    Capability(#[error(not(source))] String),
    /// Configuration was rejected.
    #[display("configuration rejected")]
    Config,
    /// A storage backend operation failed.
    #[display("storage operation failed")]
    Storage,
    /// A fingerprint probe or download failed.
    #[display("fetching from origin failed")]
    Fetch,
    /// A download was required while the device is offline.
    #[display("resource is not cached and the device is offline")]
    Offline,
    /// The download produced an empty body or fingerprint.
    #[display("download produced no content or no fingerprint")]
    EmptyDownload,
    /// The resource descriptor failed validation.
    #[display("invalid resource: {_0}")]
    Invalid(#[error(not(source))] Rejection),
}

impl ErrorKind {
    /// Returns `true` if retrying (the whole synchronization of this
    /// resource) might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Fetch | Self::Offline | Self::EmptyDownload)
    }
}
