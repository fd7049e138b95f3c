#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Shared helpers, not every test file uses every one"
)]

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, stream};
use socketio_channel::transport::TransportError;
use socketio_channel::{Connection, Result, Transport};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// In-memory transport. Hands out a single connection whose far end is a [`MockPeer`].
pub struct MockTransport {
    connection: Mutex<Option<Connection>>,
    connects: Arc<AtomicUsize>,
    failures_left: AtomicUsize,
}

/// Server side of a [`MockTransport`] connection.
pub struct MockPeer {
    /// Frames (or read failures) delivered to the client
    inbound: Option<mpsc::UnboundedSender<Result<String>>>,
    /// Frames written by the client
    outbound: mpsc::UnboundedReceiver<String>,
    closes: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> (Self, MockPeer) {
        Self::failing(0)
    }

    /// Refuse the first `failures` connection attempts.
    pub fn failing(failures: usize) -> (Self, MockPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<String>>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let closes = Arc::new(AtomicUsize::new(0));
        let connects = Arc::new(AtomicUsize::new(0));

        let reader = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let writer = RecordingSink {
            frames: outbound_tx,
            closes: Arc::clone(&closes),
        };

        let transport = Self {
            connection: Mutex::new(Some(Connection::new(reader, writer))),
            connects: Arc::clone(&connects),
            failures_left: AtomicUsize::new(failures),
        };
        let peer = MockPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            closes,
            connects,
        };

        (transport, peer)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Connection> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::connect("connection refused").into());
        }

        self.connection
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::connect("already connected").into())
    }
}

impl MockPeer {
    /// Deliver a frame to the client.
    pub fn send(&self, frame: &str) {
        if let Some(inbound) = &self.inbound {
            drop(inbound.send(Ok(frame.to_owned())));
        }
    }

    /// Make the client's next read fail.
    pub fn fail_read(&self) {
        if let Some(inbound) = &self.inbound {
            drop(inbound.send(Err(TransportError::read("connection reset").into())));
        }
    }

    /// End the client's frame stream, as a peer hanging up would.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Next frame written by the client, if one arrives within a second.
    pub async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(1), self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame written by the client that is not a heartbeat PING.
    pub async fn recv_non_ping(&mut self) -> Option<String> {
        loop {
            let frame = self.recv().await?;
            if frame != "2" {
                return Some(frame);
            }
        }
    }

    /// How many times the client closed its writer.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

/// Writer half that forwards frames to the peer and counts closes.
struct RecordingSink {
    frames: mpsc::UnboundedSender<String>,
    closes: Arc<AtomicUsize>,
}

impl Sink<String> for RecordingSink {
    type Error = socketio_channel::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: String) -> Result<()> {
        self.frames
            .send(frame)
            .map_err(|e| TransportError::write(e.to_string()).into())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}
