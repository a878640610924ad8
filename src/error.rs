use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// EmberDB errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A requested entity (table, block, key) does not exist.
    NotFound(String),
    /// Invalid data, typically decoding errors, checksum mismatches, or
    /// unexpected internal values.
    Corruption(String),
    /// The operation is not implemented or not supported by this build.
    NotSupported(String),
    /// Invalid user input, typically a bad option or argument.
    InvalidArgument(String),
    /// An IO error from the underlying file sink.
    IO(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::Corruption(msg) => write!(f, "corruption: {msg}"),
            Error::NotSupported(msg) => write!(f, "not supported: {msg}"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
        }
    }
}

/// An EmberDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::InvalidArgument("changing comparator".to_string());
        assert_eq!(err.to_string(), "invalid argument: changing comparator");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = Error::from(io);
        assert!(matches!(err, Error::IO(_)));
    }
}
