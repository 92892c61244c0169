//! Codec Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction, in the same shape as every other crate in the
//! workspace.

use derive_more::{Display, Error};

/// A codec error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stored text is not a valid encoding. Don't retry with the same input;
    /// the entry should be treated as absent and fetched again.
    #[display("invalid or corrupted encoded payload")]
    InvalidData,
    /// The payload could not be turned into text.
    #[display("payload serialization failed")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
