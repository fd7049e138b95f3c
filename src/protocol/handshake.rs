use std::time::Duration;

use serde::Deserialize;

/// Session parameters announced by the server in the engine.io `open` packet.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.io session id
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between client PINGs
    #[serde(default)]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a PING before dropping the session
    #[serde(default)]
    pub ping_timeout: u64,
}

impl Handshake {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Heartbeat interval, `None` when the server did not announce one.
    #[must_use]
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval > 0).then(|| Duration::from_millis(self.ping_interval))
    }

    #[must_use]
    pub fn ping_timeout(&self) -> Option<Duration> {
        (self.ping_timeout > 0).then(|| Duration::from_millis(self.ping_timeout))
    }
}
