use std::time::Duration;

use futures::SinkExt as _;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::Channel;
use crate::transport::FrameWriter;

/// Upper bound for the closing handshake with the peer.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drain the outbound queue into the writer in FIFO order until shutdown or a write error.
///
/// This task owns the writer, so it is the only one that ever writes to or closes the
/// connection. Frames still queued at shutdown are discarded.
pub(crate) async fn outbound_loop(
    channel: Channel,
    mut queue: mpsc::Receiver<String>,
    mut writer: FrameWriter,
) {
    let shutdown = channel.shutdown_token();

    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = queue.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(%frame, "Sending frame");

        let written = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            written = writer.send(frame) => written,
        };

        if let Err(e) = written {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Write failed, closing channel");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
            channel.close();
            break;
        }
    }

    queue.close();

    match timeout(CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Error while closing connection");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Timed out closing connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use futures::Sink;
    use serde_json::json;

    use super::*;
    use crate::channel::{ChannelState, Config};
    use crate::error::Error;
    use crate::transport::TransportError;

    /// Writer that records frames and counts closes.
    #[derive(Clone, Default)]
    struct RecordingWriter {
        frames: Arc<Mutex<Vec<String>>>,
        closes: Arc<AtomicUsize>,
        fail_writes: bool,
    }

    impl RecordingWriter {
        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl Sink<String> for RecordingWriter {
        type Error = Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, frame: String) -> Result<(), Error> {
            if self.fail_writes {
                return Err(TransportError::write("broken pipe").into());
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Error>> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn queued_frames_are_discarded_at_shutdown() {
        let (channel, queue) = Channel::new("", &Config::builder().queue_capacity(4).build());
        for n in 0..4 {
            channel.emit("tick", vec![json!(n)]).unwrap();
        }
        assert!(channel.emit("tick", vec![]).is_err());

        channel.close();
        let writer = RecordingWriter::default();
        outbound_loop(channel.clone(), queue, Box::pin(writer.clone())).await;

        assert!(writer.frames().is_empty());
        assert_eq!(writer.closes(), 1);
    }

    #[tokio::test]
    async fn frames_are_written_in_order_until_shutdown() {
        let (channel, queue) = Channel::new("/chat", &Config::builder().queue_capacity(4).build());
        channel.emit("first", vec![]).unwrap();
        channel.emit("second", vec![]).unwrap();

        let writer = RecordingWriter::default();
        let task = tokio::spawn(outbound_loop(
            channel.clone(),
            queue,
            Box::pin(writer.clone()),
        ));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while writer.frames().len() < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        channel.close();
        task.await.unwrap();

        assert_eq!(
            writer.frames(),
            vec![
                r#"42/chat,["first"]"#.to_owned(),
                r#"42/chat,["second"]"#.to_owned()
            ]
        );
        assert_eq!(writer.closes(), 1);
    }

    #[tokio::test]
    async fn write_failure_closes_channel() {
        let (channel, queue) = Channel::new("", &Config::builder().queue_capacity(4).build());
        channel.emit("tick", vec![]).unwrap();

        let writer = RecordingWriter {
            fail_writes: true,
            ..RecordingWriter::default()
        };
        outbound_loop(channel.clone(), queue, Box::pin(writer.clone())).await;

        assert!(!channel.is_alive());
        assert_eq!(channel.state(), ChannelState::Closing);
        assert!(writer.frames().is_empty());
        assert_eq!(writer.closes(), 1);
    }
}
