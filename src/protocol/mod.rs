//! Wire format: message model and the socket.io v2 text codec.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;

pub use codec::{decode, encode};
pub use error::DecodeError;
pub use handshake::Handshake;
pub use message::{Message, MessageType, Payload};

/// Engine.io protocol revision spoken by this client.
pub const ENGINE_IO_VERSION: u8 = 3;
