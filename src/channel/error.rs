#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Kind};

/// Channel error variants.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel has been shut down
    Closed,
    /// The outbound queue is full
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },
    /// No PONG arrived in time
    HeartbeatTimeout {
        /// How long the heartbeat loop waited
        timeout: Duration,
    },
    /// The peer did not acknowledge an event in time
    AckTimeout {
        /// Acknowledgement id of the unanswered event
        id: u64,
        /// How long the caller waited
        timeout: Duration,
    },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Channel closed"),
            Self::QueueFull { capacity } => {
                write!(f, "Outbound queue full ({capacity} frames pending)")
            }
            Self::HeartbeatTimeout { timeout } => {
                write!(f, "Heartbeat timeout: no PONG received within {timeout:?}")
            }
            Self::AckTimeout { id, timeout } => {
                write!(f, "Ack {id} not received within {timeout:?}")
            }
        }
    }
}

impl StdError for ChannelError {}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        let kind = match e {
            ChannelError::Closed => Kind::ChannelClosed,
            ChannelError::QueueFull { .. } => Kind::QueueFull,
            ChannelError::HeartbeatTimeout { .. } => Kind::HeartbeatTimeout,
            ChannelError::AckTimeout { .. } => Kind::AckTimeout,
        };
        Error::with_source(kind, e)
    }
}
