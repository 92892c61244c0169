//! Configuration Error Types

use derive_more::{Display, Error};
use std::io::Error as IoError;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The in-process configuration was not a non-empty object.
    #[display("configuration must be a non-empty object")]
    NotAnObject,
    /// Unknown option, wrong type, or a value that fails validation.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// Configuration file could not be read.
    #[display("cannot read configuration file: {_0}")]
    Io(IoError),
}
impl ErrorKind {
    /// Configuration errors never fix themselves.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
