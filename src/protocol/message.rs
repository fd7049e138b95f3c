use serde_json::Value;

/// Kind of a protocol unit.
///
/// The first four map to engine.io packet types `0`-`3`. The rest are engine.io `message` (`4`)
/// packets whose second digit is the socket.io packet type.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    Open,
    Close,
    Ping,
    Pong,
    /// socket.io `CONNECT` (`40`), also used as the client's open sequence
    Empty,
    /// socket.io `EVENT` (`42`), an ack request when it carries an id
    Event,
    /// socket.io `ACK` (`43`)
    Ack,
    /// socket.io `ERROR` (`44`)
    Error,
}

/// Body of a [`Message`].
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    /// Raw engine.io text, e.g. the `open` handshake JSON or a `probe` ping
    Text(String),
    /// Event name followed by its arguments
    Event { name: String, args: Vec<Value> },
    /// Acknowledgement arguments
    Args(Vec<Value>),
    /// Arbitrary JSON, used by `error` packets
    Data(Value),
}

/// One protocol unit, either built by application code or produced by [`super::decode`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageType,
    /// `None` addresses the default namespace (`/`)
    pub namespace: Option<String>,
    pub ack_id: Option<u64>,
    pub payload: Payload,
}

impl Message {
    fn bare(kind: MessageType) -> Self {
        Self {
            kind,
            namespace: None,
            ack_id: None,
            payload: Payload::None,
        }
    }

    fn text(kind: MessageType, text: Option<String>) -> Self {
        Self {
            payload: text
                .filter(|t| !t.is_empty())
                .map_or(Payload::None, Payload::Text),
            ..Self::bare(kind)
        }
    }

    #[must_use]
    pub fn open(handshake: Option<String>) -> Self {
        Self::text(MessageType::Open, handshake)
    }

    #[must_use]
    pub fn close() -> Self {
        Self::bare(MessageType::Close)
    }

    #[must_use]
    pub fn ping(text: Option<String>) -> Self {
        Self::text(MessageType::Ping, text)
    }

    #[must_use]
    pub fn pong(text: Option<String>) -> Self {
        Self::text(MessageType::Pong, text)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::bare(MessageType::Empty)
    }

    #[must_use]
    pub fn event<S: Into<String>>(name: S, args: Vec<Value>) -> Self {
        Self {
            payload: Payload::Event {
                name: name.into(),
                args,
            },
            ..Self::bare(MessageType::Event)
        }
    }

    /// An event the peer is asked to acknowledge under `ack_id`.
    #[must_use]
    pub fn event_with_ack<S: Into<String>>(name: S, args: Vec<Value>, ack_id: u64) -> Self {
        Self {
            ack_id: Some(ack_id),
            ..Self::event(name, args)
        }
    }

    #[must_use]
    pub fn ack(ack_id: u64, args: Vec<Value>) -> Self {
        Self {
            ack_id: Some(ack_id),
            payload: Payload::Args(args),
            ..Self::bare(MessageType::Ack)
        }
    }

    #[must_use]
    pub fn error(data: Option<Value>) -> Self {
        Self {
            payload: data.map_or(Payload::None, Payload::Data),
            ..Self::bare(MessageType::Error)
        }
    }

    /// Scope the message to `namespace`. `""` and `"/"` both mean the default namespace, and a
    /// missing leading `/` is added.
    #[must_use]
    pub fn in_namespace(mut self, namespace: &str) -> Self {
        let namespace = canonical_namespace(namespace);
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    /// Event name, for [`MessageType::Event`] messages.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        match &self.payload {
            Payload::Event { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Arguments carried by the message, empty when it carries none.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        match &self.payload {
            Payload::Event { args, .. } | Payload::Args(args) => args,
            Payload::Data(value) => std::slice::from_ref(value),
            Payload::None | Payload::Text(_) => &[],
        }
    }

    /// Raw text for engine.io level messages.
    #[must_use]
    pub fn text_payload(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether the peer expects an `ack` in reply.
    #[must_use]
    pub fn wants_ack(&self) -> bool {
        self.kind == MessageType::Event && self.ack_id.is_some()
    }
}

/// Map the default namespace spellings to `None`.
pub(crate) fn normalize_namespace(namespace: &str) -> Option<&str> {
    match namespace {
        "" | "/" => None,
        other => Some(other),
    }
}

/// `""` for the default namespace, otherwise the namespace with a leading `/`.
pub(crate) fn canonical_namespace(namespace: &str) -> String {
    match normalize_namespace(namespace) {
        None => String::new(),
        Some(namespace) if namespace.starts_with('/') => namespace.to_owned(),
        Some(namespace) => format!("/{namespace}"),
    }
}
