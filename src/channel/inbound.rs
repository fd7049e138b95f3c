use futures::StreamExt as _;
use serde_json::Value;

use super::methods::{CONNECTION, ERROR};
use super::{Channel, Methods};
use crate::protocol::{Handshake, Message, MessageType, decode, message::normalize_namespace};
use crate::error::Error;
use crate::transport::FrameReader;

/// Read frames until shutdown, a read error, or the end of the stream.
pub(crate) async fn inbound_loop(channel: Channel, methods: Methods, mut reader: FrameReader) {
    let shutdown = channel.shutdown_token();

    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(text)) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, "Received frame");

                match decode(&text) {
                    Ok(message) => route(&channel, &methods, message),
                    Err(e) if e.is_fatal() => {
                        #[cfg(feature = "tracing")]
                        tracing::error!(error = %e, "Malformed stream, closing channel");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                        channel.close();
                        break;
                    }
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(%text, error = %e, "Failed to decode frame");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &text;

                        let error = Error::from(e);
                        methods.call_lifecycle(
                            &channel,
                            ERROR,
                            &[Value::String(error.to_string())],
                        );
                    }
                }
            }
            Some(Err(e)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Read failed, closing channel");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                channel.close();
                break;
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Connection closed by peer");
                channel.close();
                break;
            }
        }
    }
}

fn route(channel: &Channel, methods: &Methods, message: Message) {
    match message.kind {
        MessageType::Open => {
            if let Some(text) = message.text_payload() {
                match Handshake::parse(text) {
                    Ok(handshake) => channel.set_handshake(handshake),
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(%text, error = %e, "Invalid handshake");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                }
            }
            methods.call_lifecycle(channel, CONNECTION, &[]);
        }
        MessageType::Close => {
            let ours = normalize_namespace(channel.namespace());
            if message.namespace.is_none() || message.namespace.as_deref() == ours {
                channel.close();
            } else {
                #[cfg(feature = "tracing")]
                tracing::debug!(namespace = ?message.namespace, "Disconnect for another namespace");
            }
        }
        MessageType::Ping => {
            let pong = Message::pong(message.text_payload().map(str::to_owned));
            if let Err(e) = channel.enqueue(pong) {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Unable to answer PING");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
        MessageType::Pong => channel.heartbeat().record_pong(),
        MessageType::Empty => {
            #[cfg(feature = "tracing")]
            tracing::debug!(namespace = ?message.namespace, "Namespace connected");
        }
        MessageType::Ack => {
            let Some(id) = message.ack_id else {
                return;
            };
            let args = message.args().to_vec();
            if !channel.resolve_ack(id, args) {
                #[cfg(feature = "tracing")]
                tracing::debug!(ack_id = id, "Ack without waiter, dropping");
            }
        }
        MessageType::Event => methods.dispatch(channel, &message),
        MessageType::Error => methods.call_lifecycle(channel, ERROR, message.args()),
    }
}
