use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{Connection, Transport, TransportError};
use crate::Result;
use crate::error::Error;

/// [`Transport`] over `tokio-tungstenite`. `wss://` URLs use rustls with the native roots.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsocketTransport;

impl WebsocketTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebsocketTransport {
    async fn connect(&self, url: &str) -> Result<Connection> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(TransportError::connect)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "WebSocket connected");

        let (write, read) = ws_stream.split();

        let reader = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(_)) => {
                    Some(Err(TransportError::UnexpectedFrame("binary").into()))
                }
                // Control frames are answered by tungstenite, the stream ends after Close.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_)) => {
                    None
                }
                Err(e) => Some(Err(TransportError::read(e).into())),
            })
        });

        let writer = write
            .sink_map_err(|e| Error::from(TransportError::write(e)))
            .with(|frame: String| future::ready(Ok::<_, Error>(Message::Text(frame.into()))));

        Ok(Connection::new(reader, writer))
    }
}
