#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use crate::error::{Error, Kind};

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Transport error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportError {
    /// Error establishing the connection
    Connect(BoxError),
    /// Error reading a frame from an established connection
    Read(BoxError),
    /// Error writing a frame to an established connection
    Write(BoxError),
    /// Received a frame the text protocol cannot carry
    UnexpectedFrame(&'static str),
}

impl TransportError {
    pub fn connect<E: Into<BoxError>>(e: E) -> Self {
        Self::Connect(e.into())
    }

    pub fn read<E: Into<BoxError>>(e: E) -> Self {
        Self::Read(e.into())
    }

    pub fn write<E: Into<BoxError>>(e: E) -> Self {
        Self::Write(e.into())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "Unable to connect: {e}"),
            Self::Read(e) => write!(f, "Failed to read frame: {e}"),
            Self::Write(e) => write!(f, "Failed to write frame: {e}"),
            Self::UnexpectedFrame(kind) => write!(f, "Unexpected {kind} frame"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connect(e) | Self::Read(e) | Self::Write(e) => Some(e.as_ref()),
            Self::UnexpectedFrame(_) => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        let kind = match e {
            TransportError::Connect(_) => Kind::TransportConnect,
            _ => Kind::Stream,
        };
        Error::with_source(kind, e)
    }
}
