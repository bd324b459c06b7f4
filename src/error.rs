//! Error type shared by every layer of the crate.
//!
//! Each variant is one error domain. The message carries the context chain,
//! built with [`XfsError::context`] as the error travels up from the device
//! to the walker.

use std::fmt;
use std::io;
use thiserror::Error;

/// Domain tag of an [`XfsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDomain {
    Argument,
    Memory,
    Runtime,
    Io,
    Conversion,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorDomain::Argument => "arguments",
            ErrorDomain::Memory => "memory",
            ErrorDomain::Runtime => "runtime",
            ErrorDomain::Io => "I/O",
            ErrorDomain::Conversion => "conversion",
        };
        write!(f, "{s}")
    }
}

/// Errors raised while reading an XFS image.
#[derive(Error, Debug)]
pub enum XfsError {
    /// Invalid input, out-of-range index or a size field in the image that does not fit.
    #[error("Argument error: {0}")]
    Argument(String),

    /// A buffer could not be allocated for a size read from the image.
    #[error("Memory error: {0}")]
    Memory(String),

    /// Invariant violation or use of a structure in the wrong state.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Open, seek, read, write or close failure on the backing device.
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// A name could not be rendered.
    #[error("Conversion error: {0}")]
    Conversion(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, XfsError>;

impl XfsError {
    /// Returns the domain tag of the error.
    pub fn domain(&self) -> ErrorDomain {
        match self {
            XfsError::Argument(_) => ErrorDomain::Argument,
            XfsError::Memory(_) => ErrorDomain::Memory,
            XfsError::Runtime(_) => ErrorDomain::Runtime,
            XfsError::Io { .. } => ErrorDomain::Io,
            XfsError::Conversion(_) => ErrorDomain::Conversion,
        }
    }

    /// Builds an I/O error without an underlying `io::Error`.
    pub fn io(message: impl Into<String>) -> Self {
        XfsError::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Prefixes the message with `context`, keeping the domain.
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            XfsError::Argument(msg) => XfsError::Argument(format!("{context}: {msg}")),
            XfsError::Memory(msg) => XfsError::Memory(format!("{context}: {msg}")),
            XfsError::Runtime(msg) => XfsError::Runtime(format!("{context}: {msg}")),
            XfsError::Io { message, source } => XfsError::Io {
                message: format!("{context}: {message}"),
                source,
            },
            XfsError::Conversion(msg) => XfsError::Conversion(format!("{context}: {msg}")),
        }
    }
}

/// Converts standard I/O errors into XfsError.
impl From<io::Error> for XfsError {
    fn from(err: io::Error) -> Self {
        XfsError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Converts BinRead errors into XfsError.
///
/// Structures are decoded from buffers whose length was already checked, so
/// anything but an I/O failure means the bytes themselves are malformed.
impl From<binread::Error> for XfsError {
    fn from(err: binread::Error) -> Self {
        match err {
            binread::Error::Io(err) => XfsError::from(err),
            other => XfsError::Argument(format!("malformed structure: {other}")),
        }
    }
}
