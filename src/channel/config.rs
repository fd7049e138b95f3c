#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(25);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_secs(20);
const DEFAULT_QUEUE_CAPACITY: usize = 500;
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_millis(500);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for a channel.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Interval for sending PING messages to keep connection alive
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Maximum time to wait for PONG response before considering connection dead
    #[builder(default = DEFAULT_HEARTBEAT_TIMEOUT_DURATION)]
    pub heartbeat_timeout: Duration,
    /// Replace the two heartbeat settings above with the values announced in the server's
    /// `open` handshake
    #[builder(default = true)]
    pub adopt_server_heartbeat: bool,
    /// Number of encoded frames the outbound queue holds before `emit` reports it full
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Retry strategy for the initial transport connect
    #[builder(default)]
    pub connect_retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configuration for retrying the initial connect.
///
/// A closed channel is never reconnected; this only covers the attempt made by
/// [`crate::dial`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of connect attempts, at least one is always made
    pub max_attempts: u32,
    /// Initial backoff duration for the first retry
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Retry up to `max_attempts` attempts in total with the default backoff.
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<RetryConfig> for ExponentialBackoff {
    fn from(config: RetryConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;

    #[test]
    fn backoff_sequence() {
        let config = RetryConfig::default();
        let mut backoff: ExponentialBackoff = config.into();

        // First backoff should be around initial_backoff (with some jitter)
        let first = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(250) && first <= Duration::from_millis(750));
    }

    #[test]
    fn backoff_respects_max() {
        let config = RetryConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 3.0,
            max_attempts: 5,
        };
        let mut backoff: ExponentialBackoff = config.into();

        for _ in 0..10 {
            let _next = backoff.next_backoff();
        }

        let duration = backoff.next_backoff().unwrap();
        assert!(duration <= Duration::from_secs(3));
    }

    #[test]
    fn defaults_make_a_single_attempt() {
        let config = Config::default();

        assert_eq!(config.connect_retry.max_attempts, 1);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(config.queue_capacity, 500);
        assert!(config.adopt_server_heartbeat);
    }

    #[test]
    fn builder_overrides() {
        let config = Config::builder()
            .heartbeat_interval(Duration::from_millis(50))
            .queue_capacity(2)
            .connect_retry(RetryConfig::attempts(3))
            .build();

        assert_eq!(config.heartbeat_interval, Duration::from_millis(50));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(20));
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.connect_retry.max_attempts, 3);
    }
}
