//! Transport boundary for the channel runtime.
//!
//! The channel only needs a way to open a connection and a split pair of text frame
//! reader/writer once it is open. [`Transport`] is that seam; [`WebsocketTransport`] is the
//! production implementation and tests plug in-memory ones.

pub mod error;
#[cfg(feature = "websocket")]
pub mod websocket;

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Sink, Stream, StreamExt as _};

pub use error::{BoxError, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::WebsocketTransport;

use crate::Result;
use crate::error::Error;

/// Inbound half of a connection. Ends when the peer closes the connection.
pub type FrameReader = BoxStream<'static, Result<String>>;

/// Outbound half of a connection. Closing it closes the connection.
pub type FrameWriter = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// An established duplex connection, split so reads and writes can run in separate tasks.
#[non_exhaustive]
pub struct Connection {
    pub reader: FrameReader,
    pub writer: FrameWriter,
}

impl Connection {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Stream<Item = Result<String>> + Send + 'static,
        W: Sink<String, Error = Error> + Send + 'static,
    {
        Self {
            reader: reader.boxed(),
            writer: Box::pin(writer),
        }
    }
}

/// Opens connections to a socket URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Connection>;
}
