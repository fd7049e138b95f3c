//! Channel runtime.
//!
//! A [`Channel`] is the shared state of one connection. Three tasks run against it:
//!
//! - the inbound loop reads and decodes frames and routes them
//! - the outbound loop is the only writer to the transport
//! - the heartbeat loop sends PINGs and closes the channel when PONGs stop
//!
//! Any of them, the peer, or the application may call [`Channel::close`]; only the first call
//! has an effect.

pub(crate) mod ack;
pub mod config;
pub mod error;
pub(crate) mod heartbeat;
pub(crate) mod inbound;
pub mod methods;
pub(crate) mod outbound;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub use config::{Config, RetryConfig};
pub use error::ChannelError;
pub use methods::{CONNECTION, DISCONNECTION, ERROR, Handler, HandlerError, HandlerResult, Methods};

use self::ack::AckTable;
use self::heartbeat::HeartbeatState;
use crate::Result;
use crate::protocol::message::canonical_namespace;
use crate::protocol::{Handshake, Message, encode};

/// Lifecycle of a channel. `Closed` is terminal.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ChannelState {
    /// Transport connect in progress
    Connecting,
    /// Connected, loops running
    Open,
    /// Shutdown triggered, loops winding down
    Closing,
    /// Connection released and every loop has exited
    Closed,
}

impl ChannelState {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Handle to the shared state of one connection. Cloning is cheap.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Shared>,
}

struct Shared {
    namespace: String,
    /// Sender side of the outbound queue of encoded frames
    out: mpsc::Sender<String>,
    capacity: usize,
    alive: AtomicBool,
    /// Set by the first `close`, guards the shutdown path
    closing: AtomicBool,
    state_tx: watch::Sender<ChannelState>,
    shutdown: CancellationToken,
    acks: AckTable,
    heartbeat: HeartbeatState,
    adopt_server_heartbeat: bool,
    handshake: RwLock<Option<Handshake>>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("namespace", &self.inner.namespace)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create a channel in the `Connecting` state together with the receiving end of its
    /// outbound queue, which belongs to the outbound loop.
    #[must_use]
    pub fn new(namespace: &str, config: &Config) -> (Self, mpsc::Receiver<String>) {
        let capacity = config.queue_capacity.max(1);
        let (out, queue) = mpsc::channel(capacity);
        let (state_tx, _) = watch::channel(ChannelState::Connecting);

        let channel = Self {
            inner: Arc::new(Shared {
                namespace: canonical_namespace(namespace),
                out,
                capacity,
                alive: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                state_tx,
                shutdown: CancellationToken::new(),
                acks: AckTable::new(),
                heartbeat: HeartbeatState::new(config.heartbeat_interval, config.heartbeat_timeout),
                adopt_server_heartbeat: config.adopt_server_heartbeat,
                handshake: RwLock::new(None),
            }),
        };

        (channel, queue)
    }

    /// Namespace derived from the dial URL, `""` for the default one.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ChannelState> {
        self.inner.state_tx.subscribe()
    }

    /// Server handshake, once the `open` packet has arrived.
    #[must_use]
    pub fn handshake(&self) -> Option<Handshake> {
        self.inner
            .handshake
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Engine.io session id, once known.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.handshake().map(|handshake| handshake.sid)
    }

    /// Queue `message` for the outbound loop.
    ///
    /// Never waits: a full queue is reported as [`ChannelError::QueueFull`], and anything after
    /// shutdown as [`ChannelError::Closed`].
    pub fn enqueue(&self, message: Message) -> Result<()> {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed.into());
        }

        let frame = encode(&message, &self.inner.namespace)?;

        self.inner.out.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::QueueFull {
                capacity: self.inner.capacity,
            },
            TrySendError::Closed(_) => ChannelError::Closed,
        })?;

        Ok(())
    }

    /// Send an event.
    pub fn emit<S: Into<String>>(&self, event: S, args: Vec<Value>) -> Result<()> {
        self.enqueue(Message::event(event, args))
    }

    /// Send an event and wait up to `timeout_duration` for the peer's acknowledgement.
    pub async fn emit_with_ack<S: Into<String>>(
        &self,
        event: S,
        args: Vec<Value>,
        timeout_duration: Duration,
    ) -> Result<Vec<Value>> {
        // Register before queueing so a racing close either sees the waiter or we see it closing
        let (id, rx) = self.inner.acks.register();

        if let Err(e) = self.enqueue(Message::event_with_ack(event, args, id)) {
            self.inner.acks.remove(id);
            return Err(e);
        }

        match timeout(timeout_duration, rx).await {
            Ok(Ok(args)) => Ok(args),
            Ok(Err(_)) => Err(ChannelError::Closed.into()),
            Err(_) => {
                self.inner.acks.remove(id);
                Err(ChannelError::AckTimeout {
                    id,
                    timeout: timeout_duration,
                }
                .into())
            }
        }
    }

    /// Shut the channel down.
    ///
    /// Only the first call does anything: it marks the channel dead, stops all three loops,
    /// and fails pending acknowledgements. The outbound loop closes the connection on its way
    /// out. Returns whether this call initiated the shutdown.
    pub fn close(&self) -> bool {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.state_tx.send_replace(ChannelState::Closing);
        self.inner.shutdown.cancel();
        self.inner.acks.fail_all();

        #[cfg(feature = "tracing")]
        tracing::debug!(namespace = %self.inner.namespace, "Channel closing");

        true
    }

    /// Wait until the channel has reached [`ChannelState::Closed`].
    pub async fn closed(&self) {
        let mut state_rx = self.inner.state_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once Closed is observed
        _ = state_rx
            .wait_for(|state| *state == ChannelState::Closed)
            .await;
    }

    /// Number of `emit_with_ack` calls still waiting for the peer.
    #[must_use]
    pub fn pending_acks(&self) -> usize {
        self.inner.acks.pending()
    }

    /// Whether a PING is out without a PONG yet.
    #[must_use]
    pub fn ping_pending(&self) -> bool {
        self.inner.heartbeat.is_pending()
    }

    pub(crate) fn mark_open(&self) {
        if self.inner.closing.load(Ordering::SeqCst) {
            return;
        }
        self.inner.alive.store(true, Ordering::SeqCst);
        self.inner.state_tx.send_if_modified(|state| {
            if *state == ChannelState::Connecting {
                *state = ChannelState::Open;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn mark_closed(&self) {
        self.inner.state_tx.send_replace(ChannelState::Closed);
    }

    pub(crate) fn set_handshake(&self, handshake: Handshake) {
        if self.inner.adopt_server_heartbeat {
            self.inner.heartbeat.adopt(&handshake);
        }
        *self
            .inner
            .handshake
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handshake);
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub(crate) fn heartbeat(&self) -> &HeartbeatState {
        &self.inner.heartbeat
    }

    /// Deliver an inbound acknowledgement to its waiter.
    pub(crate) fn resolve_ack(&self, id: u64, args: Vec<Value>) -> bool {
        self.inner.acks.resolve(id, args)
    }
}
