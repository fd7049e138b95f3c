use std::error::Error as StdError;
use std::fmt;
use std::num::ParseIntError;

/// Reasons an inbound frame could not be decoded.
///
/// Most variants only affect the frame they were raised for and the inbound loop moves on.
/// [`DecodeError::is_fatal`] singles out the ones that mean the stream itself is broken.
#[non_exhaustive]
#[derive(Debug)]
pub enum DecodeError {
    /// Zero-length frame; the peer is not speaking engine.io
    Empty,
    /// Leading engine.io packet type is not one we know
    UnknownPacketType(char),
    /// Known engine.io/socket.io packet that this client does not handle (upgrade, noop, binary)
    UnsupportedPacket(String),
    /// Engine.io `message` packet without a socket.io packet type
    MissingSocketType,
    /// Socket.io packet type digit is out of range
    UnknownSocketType(char),
    /// Digits where an acknowledgement id was expected did not fit a `u64`
    InvalidAckId(ParseIntError),
    /// An `ack` packet arrived without an id
    MissingAckId,
    /// Payload was not valid JSON
    InvalidJson(serde_json::Error),
    /// Event payload was not an array headed by the event name
    InvalidEvent(String),
}

impl DecodeError {
    /// Whether the error means the stream cannot be trusted anymore.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty frame"),
            Self::UnknownPacketType(c) => write!(f, "unknown engine.io packet type {c:?}"),
            Self::UnsupportedPacket(packet) => write!(f, "unsupported packet {packet:?}"),
            Self::MissingSocketType => write!(f, "message packet without socket.io type"),
            Self::UnknownSocketType(c) => write!(f, "unknown socket.io packet type {c:?}"),
            Self::InvalidAckId(e) => write!(f, "invalid acknowledgement id: {e}"),
            Self::MissingAckId => write!(f, "ack packet without acknowledgement id"),
            Self::InvalidJson(e) => write!(f, "invalid JSON payload: {e}"),
            Self::InvalidEvent(payload) => write!(f, "invalid event payload: {payload}"),
        }
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidAckId(e) => Some(e),
            Self::InvalidJson(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for crate::error::Error {
    fn from(e: DecodeError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::FrameDecode, e)
    }
}
