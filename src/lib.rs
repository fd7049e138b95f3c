#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod channel;
pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

pub use channel::{
    CONNECTION, Channel, ChannelState, Config, DISCONNECTION, ERROR, HandlerResult, Methods,
    RetryConfig,
};
pub use client::{Client, dial, dial_with, get_socket_url, get_url};
pub use error::Error;
pub use protocol::{Message, MessageType};
pub use serde_json::{Value, json};
#[cfg(feature = "websocket")]
pub use transport::WebsocketTransport;
pub use transport::{Connection, Transport};

pub type Result<T> = std::result::Result<T, Error>;
