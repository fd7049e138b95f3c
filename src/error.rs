use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The URL handed to [`crate::dial`] could not be turned into a socket URL
    UrlParse,
    /// The transport failed to establish a connection
    TransportConnect,
    /// A single inbound frame could not be decoded
    FrameDecode,
    /// Reading from or writing to an established connection failed
    Stream,
    /// No PONG arrived within the heartbeat timeout
    HeartbeatTimeout,
    /// The channel was already shut down when the operation was attempted
    ChannelClosed,
    /// The outbound queue is at capacity
    QueueFull,
    /// The peer did not acknowledge an event within the requested timeout
    AckTimeout,
    /// A user-registered handler failed
    Handler,
    /// Error related to invalid input
    Validation,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    /// Whether this error means the channel is gone, as opposed to a per-call failure.
    #[must_use]
    pub fn is_channel_closed(&self) -> bool {
        self.kind == Kind::ChannelClosed
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

/// Failure to derive a socket URL from user input.
#[non_exhaustive]
#[derive(Debug)]
pub enum UrlError {
    /// The input is not a URL at all
    Parse(url::ParseError),
    /// The URL has no host component
    MissingHost(String),
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "malformed URL: {e}"),
            Self::MissingHost(url) => write!(f, "URL has no host: {url}"),
        }
    }
}

impl StdError for UrlError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::MissingHost(_) => None,
        }
    }
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        Error::with_source(Kind::UrlParse, err)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        UrlError::Parse(e).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}
