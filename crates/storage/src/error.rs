//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::backend::BackendKind;
use derive_more::{Display, Error};
use resync_codec::error::{Error as CodecError, ErrorKind as CodecErrorKind};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Key is empty, contains control characters, or collides with the
    /// metadata suffix.
    #[display("invalid key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Payload could not be encoded for (or decoded from) a string store.
    #[display("codec error: {_0}")]
    Codec(CodecErrorKind),
    /// A stored entry exists but cannot be interpreted.
    #[display("malformed record: {_0}")]
    MalformedRecord(#[error(not(source))] String),
    /// The host cannot provide the requested backend.
    #[display("backend unavailable: {_0}")]
    Unavailable(#[error(not(source))] BackendKind),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Convert a codec error into a storage error, preserving the codec
    /// crate's `Exn` frame (error tree) as a child in its own error tree.
    #[track_caller]
    pub fn codec(err: CodecError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Codec(inner))
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}
