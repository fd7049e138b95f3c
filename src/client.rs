use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff as _;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use url::Url;

use crate::Result;
use crate::channel::heartbeat::heartbeat_loop;
use crate::channel::inbound::inbound_loop;
use crate::channel::outbound::outbound_loop;
use crate::channel::{
    Channel, ChannelState, Config, DISCONNECTION, HandlerResult, Methods, RetryConfig,
};
use crate::error::UrlError;
use crate::protocol::{ENGINE_IO_VERSION, Handshake, Message};
use crate::transport::{Connection, Transport};

const WEB_SOCKET_PROTOCOL: &str = "ws://";
const WEB_SOCKET_SECURE_PROTOCOL: &str = "wss://";
const SOCKET_IO_PATH: &str = "/socket.io/";

/// Build the websocket URL for a socket.io server at `host:port`.
///
/// ```
/// assert_eq!(
///     socketio_channel::get_url("example.com", 80, false),
///     "ws://example.com:80/socket.io/?EIO=3&transport=websocket"
/// );
/// ```
#[must_use]
pub fn get_url(host: &str, port: u16, secure: bool) -> String {
    let prefix = if secure {
        WEB_SOCKET_SECURE_PROTOCOL
    } else {
        WEB_SOCKET_PROTOCOL
    };
    format!("{prefix}{host}:{port}{SOCKET_IO_PATH}?EIO={ENGINE_IO_VERSION}&transport=websocket")
}

/// Derive the websocket URL and namespace from a server URL.
///
/// `https`/`wss` select a secure connection on port 443, anything else (including no scheme)
/// a plain one on port 80, unless the URL names a port. A query string is carried over and a
/// path becomes the namespace.
pub fn get_socket_url(url: &str) -> Result<(String, String)> {
    // a scheme only counts when it comes before any path, query or fragment
    let (has_scheme, after_scheme) = match url.split_once("://") {
        Some((scheme, rest)) if !scheme.contains(['/', '?', '#']) => (true, rest),
        _ => (false, url),
    };
    let url_info = if has_scheme {
        Url::parse(url)?
    } else {
        Url::parse(&format!("http://{url}"))?
    };

    let secure = matches!(url_info.scheme(), "https" | "wss");
    let default_port = if secure { 443 } else { 80 };
    let port = url_info.port().unwrap_or(default_port);
    let host = url_info
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| UrlError::MissingHost(url.to_owned()))?;

    let mut socket_url = get_url(host, port, secure);
    if let Some(query) = url_info.query().filter(|query| !query.is_empty()) {
        socket_url.push('&');
        socket_url.push_str(query);
    }

    // `Url` reports "/" for an absent path, only keep it when the input really had one
    let has_path = after_scheme
        .chars()
        .find(|c| matches!(c, '/' | '?' | '#'))
        == Some('/');
    let namespace = if has_path {
        url_info.path().to_owned()
    } else {
        String::new()
    };

    Ok((socket_url, namespace))
}

/// Connect to `url` with the default [`Config`] and start the channel.
///
/// ```no_run
/// use socketio_channel::{WebsocketTransport, dial};
/// use socketio_channel::json;
///
/// # async fn example() -> socketio_channel::Result<()> {
/// let client = dial("http://localhost:3000/chat", WebsocketTransport::new()).await?;
/// client.on("message", |_, args| {
///     println!("{args:?}");
///     Ok(None)
/// });
/// client.emit("message", vec![json!("hello")])?;
/// # Ok(())
/// # }
/// ```
pub async fn dial<T: Transport>(url: &str, transport: T) -> Result<Client> {
    dial_with(url, transport, Config::default(), Methods::new()).await
}

/// Connect to `url` with an explicit [`Config`] and a prepared set of handlers.
///
/// Handlers in `methods` are in place before the first frame is read, so they see the
/// [`crate::channel::CONNECTION`] event.
pub async fn dial_with<T: Transport>(
    url: &str,
    transport: T,
    config: Config,
    methods: Methods,
) -> Result<Client> {
    let (socket_url, namespace) = get_socket_url(url)?;

    let (channel, queue) = Channel::new(&namespace, &config);

    let Connection { reader, writer } =
        connect_with_retry(&transport, &socket_url, &config.connect_retry).await?;

    channel.mark_open();

    let mut loops = JoinSet::new();
    loops.spawn(inbound_loop(channel.clone(), methods.clone(), reader));
    loops.spawn(outbound_loop(channel.clone(), queue, writer));
    loops.spawn(heartbeat_loop(channel.clone()));

    tokio::spawn(reap(channel.clone(), methods.clone(), loops));

    Ok(Client {
        inner: Arc::new(ClientInner { channel, methods }),
    })
}

async fn connect_with_retry<T: Transport>(
    transport: &T,
    socket_url: &str,
    retry: &RetryConfig,
) -> Result<Connection> {
    let mut backoff: backoff::ExponentialBackoff = retry.clone().into();
    let mut attempt = 0_u32;

    loop {
        attempt = attempt.saturating_add(1);

        match transport.connect(socket_url).await {
            Ok(connection) => return Ok(connection),
            Err(e) if attempt >= retry.max_attempts => return Err(e),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%socket_url, attempt, error = %e, "Unable to connect, retrying");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;

                match backoff.next_backoff() {
                    Some(duration) => tokio::time::sleep(duration).await,
                    None => return Err(e),
                }
            }
        }
    }
}

/// Wait for the three loops, make sure the rest stop once one exits, then fire
/// [`DISCONNECTION`] and publish `Closed`.
async fn reap(channel: Channel, methods: Methods, mut loops: JoinSet<()>) {
    while let Some(result) = loops.join_next().await {
        if let Err(e) = result {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %e, "Channel loop terminated abnormally");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
        channel.close();
    }

    methods.call_lifecycle(&channel, DISCONNECTION, &[]);

    channel.mark_closed();

    #[cfg(feature = "tracing")]
    tracing::debug!(namespace = %channel.namespace(), "Channel closed");
}

/// socket.io client.
///
/// Holds the [`Channel`] and the [`Methods`] registry of one connection. Clones share both; the
/// channel is closed once the last clone is dropped.
///
/// Handlers receive a [`Channel`] to reply through. A handler that captures a [`Client`] keeps
/// it alive and disables the close-on-drop.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    channel: Channel,
    methods: Methods,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.channel.close();
    }
}

impl Client {
    /// Close the connection and wait until every loop has stopped.
    pub async fn close(&self) {
        self.inner.channel.close();
        self.inner.channel.closed().await;
    }

    /// Send the socket.io connect packet for the channel namespace.
    pub fn send_open_sequence(&self) -> Result<()> {
        self.inner.channel.enqueue(Message::empty())
    }

    /// Register `handler` for `event`.
    pub fn on<S, F>(&self, event: S, handler: F)
    where
        S: Into<String>,
        F: Fn(&Channel, &[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.methods.on(event, handler);
    }

    /// Send an event with the given arguments.
    pub fn emit<S: Into<String>>(&self, event: S, args: Vec<Value>) -> Result<()> {
        self.inner.channel.emit(event, args)
    }

    /// Send an event whose single argument is `payload` serialized to JSON.
    pub fn send<S: Into<String>, P: Serialize>(&self, event: S, payload: &P) -> Result<()> {
        let value = serde_json::to_value(payload)?;
        self.inner.channel.emit(event, vec![value])
    }

    /// Send an event and wait for the peer to acknowledge it.
    pub async fn emit_with_ack<S: Into<String>>(
        &self,
        event: S,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>> {
        self.inner.channel.emit_with_ack(event, args, timeout).await
    }

    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    #[must_use]
    pub fn methods(&self) -> &Methods {
        &self.inner.methods
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.inner.channel.state()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel.state_receiver()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.channel.is_alive()
    }

    /// Session id assigned by the server in the `open` handshake.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.inner.channel.id()
    }

    #[must_use]
    pub fn handshake(&self) -> Option<Handshake> {
        self.inner.channel.handshake()
    }

    /// Wait until the channel has closed, whoever closed it.
    pub async fn closed(&self) {
        self.inner.channel.closed().await;
    }
}
