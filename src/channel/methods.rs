use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use super::Channel;
use crate::error::{Error, Kind};
use crate::protocol::Message;
use crate::transport::BoxError;

/// Fired once the `open` handshake has been received.
pub const CONNECTION: &str = "connection";
/// Fired once after the channel has fully closed.
pub const DISCONNECTION: &str = "disconnection";
/// Fired for peer `error` packets (with the packet payload), for failing handlers (with
/// `[event, error]`) and for frames that could not be decoded (with `[error]`).
pub const ERROR: &str = "error";

/// What a handler hands back: an optional acknowledgement value, or a failure.
pub type HandlerResult = std::result::Result<Option<Value>, BoxError>;

/// Callback invoked for an inbound event.
///
/// Implemented for every `Fn(&Channel, &[Value]) -> HandlerResult`. Returning `Ok(Some(v))` for
/// an event the peer asked to be acknowledged sends `v` back as the acknowledgement.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, channel: &Channel, args: &[Value]) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&Channel, &[Value]) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, channel: &Channel, args: &[Value]) -> HandlerResult {
        self(channel, args)
    }
}

/// A handler failed while processing `event`.
#[non_exhaustive]
#[derive(Debug)]
pub struct HandlerError {
    pub event: String,
    pub source: BoxError,
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler for {:?} failed: {}", self.event, self.source)
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<HandlerError> for Error {
    fn from(e: HandlerError) -> Self {
        Error::with_source(Kind::Handler, e)
    }
}

/// Registry of event handlers and the dispatch logic over it.
#[derive(Clone, Default)]
pub struct Methods {
    handlers: Arc<DashMap<String, Vec<Arc<dyn Handler>>>>,
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Methods")
            .field("events", &self.handlers.len())
            .finish()
    }
}

impl Methods {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. Handlers for one event run in registration order.
    pub fn on<S, F>(&self, event: S, handler: F)
    where
        S: Into<String>,
        F: Fn(&Channel, &[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, |entry| entry.len())
    }

    /// Snapshot so handlers can register more handlers without deadlocking the shard.
    fn handlers(&self, event: &str) -> Vec<Arc<dyn Handler>> {
        self.handlers
            .get(event)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Run the handlers for an inbound event and acknowledge it if the peer asked for that and a
    /// handler produced a reply.
    pub(crate) fn dispatch(&self, channel: &Channel, message: &Message) {
        let Some(event) = message.event_name() else {
            return;
        };

        let handlers = self.handlers(event);
        if handlers.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(%event, "No handler registered, dropping event");
            return;
        }

        let reply = self.invoke(channel, event, &handlers, message.args());

        let ack_id = message.ack_id.filter(|_| message.wants_ack());
        if let (Some(id), Some(reply)) = (ack_id, reply) {
            let mut ack = Message::ack(id, vec![reply]);
            if let Some(namespace) = &message.namespace {
                ack = ack.in_namespace(namespace);
            }
            if let Err(e) = channel.enqueue(ack) {
                #[cfg(feature = "tracing")]
                tracing::warn!(%event, ack_id = id, error = %e, "Unable to send acknowledgement");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
    }

    /// Fire a lifecycle event such as [`CONNECTION`] or [`DISCONNECTION`].
    pub(crate) fn call_lifecycle(&self, channel: &Channel, event: &str, args: &[Value]) {
        let handlers = self.handlers(event);
        self.invoke(channel, event, &handlers, args);
    }

    /// Call every handler in order and return the first reply value.
    fn invoke(
        &self,
        channel: &Channel,
        event: &str,
        handlers: &[Arc<dyn Handler>],
        args: &[Value],
    ) -> Option<Value> {
        let mut reply = None;

        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.call(channel, args)))
                .unwrap_or_else(|panic| Err(panic_message(panic.as_ref()).into()));

            match outcome {
                Ok(value) => {
                    if reply.is_none() {
                        reply = value;
                    }
                }
                Err(source) => self.report(
                    channel,
                    HandlerError {
                        event: event.to_owned(),
                        source,
                    },
                ),
            }
        }

        reply
    }

    /// Log a handler failure and forward it to the [`ERROR`] handlers.
    fn report(&self, channel: &Channel, error: HandlerError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(event = %error.event, error = %error.source, "Handler failed");

        // a failing error handler is only logged
        if error.event == ERROR {
            return;
        }

        let args = [
            Value::String(error.event.clone()),
            Value::String(error.source.to_string()),
        ];
        for handler in self.handlers(ERROR) {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.call(channel, &args)));
            if !matches!(outcome, Ok(Ok(_))) {
                #[cfg(feature = "tracing")]
                tracing::warn!(event = %error.event, "Error handler failed while reporting");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::channel::Config;

    fn channel() -> (Channel, tokio::sync::mpsc::Receiver<String>) {
        Channel::new("", &Config::default())
    }

    #[test]
    fn handlers_run_in_registration_order_with_args() {
        let (channel, _queue) = channel();
        let methods = Methods::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let calls = Arc::clone(&calls);
            methods.on("chat", move |_: &Channel, args: &[Value]| {
                calls.lock().unwrap().push((tag, args.to_vec()));
                Ok(None)
            });
        }

        methods.dispatch(&channel, &Message::event("chat", vec![json!("hi"), json!(1)]));

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("first", vec![json!("hi"), json!(1)]),
                ("second", vec![json!("hi"), json!(1)]),
            ]
        );
    }

    #[test]
    fn unknown_event_is_dropped() {
        let (channel, mut queue) = channel();
        let methods = Methods::new();

        methods.dispatch(&channel, &Message::event_with_ack("nobody", vec![], 1));

        assert_eq!(methods.handler_count("nobody"), 0);
        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn reply_to_ack_request_is_queued() {
        let (channel, mut queue) = channel();
        let methods = Methods::new();
        methods.on("add", |_: &Channel, args: &[Value]| {
            let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
            Ok(Some(json!(sum)))
        });

        methods.dispatch(
            &channel,
            &Message::event_with_ack("add", vec![json!(2), json!(3)], 9).in_namespace("/math"),
        );

        assert_eq!(queue.try_recv().unwrap(), "43/math,9[5]");
    }

    #[test]
    fn reply_without_ack_request_is_not_sent() {
        let (channel, mut queue) = channel();
        let methods = Methods::new();
        methods.on("add", |_: &Channel, _: &[Value]| Ok(Some(json!(1))));

        methods.dispatch(&channel, &Message::event("add", vec![]));

        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn failing_handler_is_isolated_and_reported() {
        let (channel, _queue) = channel();
        let methods = Methods::new();
        let reached = Arc::new(Mutex::new(false));
        let reported = Arc::new(Mutex::new(Vec::new()));

        methods.on("chat", |_: &Channel, _: &[Value]| Err("boom".into()));
        methods.on("chat", |_: &Channel, _: &[Value]| -> HandlerResult {
            panic!("kaboom");
        });
        {
            let reached = Arc::clone(&reached);
            methods.on("chat", move |_: &Channel, _: &[Value]| {
                *reached.lock().unwrap() = true;
                Ok(None)
            });
        }
        {
            let reported = Arc::clone(&reported);
            methods.on(ERROR, move |_: &Channel, args: &[Value]| {
                reported.lock().unwrap().push(args.to_vec());
                Ok(None)
            });
        }

        methods.dispatch(&channel, &Message::event("chat", vec![]));

        assert!(*reached.lock().unwrap());
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 2);
        assert_eq!(reported[0], vec![json!("chat"), json!("boom")]);
        assert_eq!(reported[1], vec![json!("chat"), json!("handler panicked: kaboom")]);
    }

    #[test]
    fn handler_error_converts_to_handler_kind() {
        let error: Error = HandlerError {
            event: "chat".to_owned(),
            source: "boom".into(),
        }
        .into();

        assert_eq!(error.kind(), Kind::Handler);
        assert_eq!(error.to_string(), "Handler: handler for \"chat\" failed: boom");
    }
}
