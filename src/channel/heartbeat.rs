use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout_at};

use super::Channel;
use super::error::ChannelError;
use crate::protocol::{Handshake, Message};

/// PING/PONG bookkeeping shared by the heartbeat loop and the inbound loop.
pub(crate) struct HeartbeatState {
    /// Time of the last PONG, notifies the heartbeat loop
    last_pong: watch::Sender<Instant>,
    /// A PING is out and no PONG has answered it yet
    pending_ping: AtomicBool,
    timing: RwLock<Timing>,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatState {
    pub(crate) fn new(interval: Duration, timeout: Duration) -> Self {
        let (last_pong, _) = watch::channel(Instant::now());
        Self {
            last_pong,
            pending_ping: AtomicBool::new(false),
            timing: RwLock::new(Timing { interval, timeout }),
        }
    }

    pub(crate) fn record_ping(&self) {
        self.pending_ping.store(true, Ordering::SeqCst);
    }

    pub(crate) fn record_pong(&self) {
        self.last_pong.send_replace(Instant::now());
        self.pending_ping.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending_ping.load(Ordering::SeqCst)
    }

    /// Take over the server's announced timings, keeping ours for anything it left out.
    pub(crate) fn adopt(&self, handshake: &Handshake) {
        // We can recover from poisoned lock because Timing is plain Copy data.
        let mut timing = self
            .timing
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(interval) = handshake.ping_interval() {
            timing.interval = interval;
        }
        if let Some(timeout) = handshake.ping_timeout() {
            timing.timeout = timeout;
        }
    }

    fn timing(&self) -> Timing {
        *self.timing.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self) -> watch::Receiver<Instant> {
        self.last_pong.subscribe()
    }
}

/// Heartbeat loop that sends PING messages and monitors PONG responses.
pub(crate) async fn heartbeat_loop(channel: Channel) {
    let shutdown = channel.shutdown_token();
    let heartbeat = channel.heartbeat();
    let mut pong_rx = heartbeat.subscribe();

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = sleep(heartbeat.timing().interval) => {}
        }

        // Re-read, the handshake may have replaced the timings while we slept
        let timing = heartbeat.timing();

        // Mark current PONG state as seen before sending PING
        // This prevents changed() from returning immediately due to a stale PONG
        drop(pong_rx.borrow_and_update());

        let ping_sent = Instant::now();
        match channel.enqueue(Message::ping(None)) {
            Ok(()) => heartbeat.record_ping(),
            Err(e) if e.is_channel_closed() => break,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to queue PING, skipping this round");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                continue;
            }
        }

        let answered = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            answered = wait_for_pong(&mut pong_rx, ping_sent, timing.timeout) => answered,
        };

        match answered {
            Some(true) => {}
            Some(false) => {
                let error = ChannelError::HeartbeatTimeout {
                    timeout: timing.timeout,
                };
                #[cfg(feature = "tracing")]
                tracing::warn!(namespace = channel.namespace(), "{error}");
                #[cfg(not(feature = "tracing"))]
                let _ = &error;
                channel.close();
                break;
            }
            // PONG sender is gone, the channel is being torn down
            None => break,
        }
    }
}

/// Wait until a PONG newer than `ping_sent` arrives or `timeout` elapses.
///
/// `Some(true)` when answered, `Some(false)` on timeout, `None` if the watch closed.
async fn wait_for_pong(
    pong_rx: &mut watch::Receiver<Instant>,
    ping_sent: Instant,
    timeout: Duration,
) -> Option<bool> {
    let deadline = ping_sent + timeout;

    loop {
        match timeout_at(deadline, pong_rx.changed()).await {
            Ok(Ok(())) => {
                let last_pong = *pong_rx.borrow_and_update();
                if last_pong >= ping_sent {
                    return Some(true);
                }
                #[cfg(feature = "tracing")]
                tracing::debug!("PONG received but older than last PING, still waiting");
            }
            Ok(Err(_)) => return None,
            Err(_) => return Some(false),
        }
    }
}
