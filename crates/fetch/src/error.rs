//! Fetch Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, DNS, TLS or protocol failure.
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// The origin answered with a non-success status.
    #[display("origin responded with HTTP {_0}")]
    Status(#[error(not(source))] u16),
    /// The probe did not answer within its bound.
    #[display("probe timed out")]
    Timeout,
    /// The body cannot be turned into the requested content type.
    #[display("invalid response body: {_0}")]
    InvalidBody(#[error(not(source))] String),
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed. Nothing in this workspace
    /// retries automatically; this is for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status(status) => *status == 429 || *status >= 500,
            Self::InvalidBody(_) => false,
        }
    }
}
