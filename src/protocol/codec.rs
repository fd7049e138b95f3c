//! socket.io v2 text encoding over engine.io v3.
//!
//! ```text
//! 0{"sid":...}          open           1        close
//! 41/nsp,               close of one namespace
//! 2[probe]              ping           3[probe] pong
//! 40[/nsp,]             empty (connect)
//! 42[/nsp,][id]["name",...args]        event / ack request
//! 43[/nsp,]id[...args]                 ack
//! 44[/nsp,]<json>                      error
//! ```

use serde_json::Value;

use super::error::DecodeError;
use super::message::{Message, MessageType, Payload, normalize_namespace};
use crate::Result;
use crate::error::Error;

const OPEN: char = '0';
const CLOSE: char = '1';
const PING: char = '2';
const PONG: char = '3';
const MESSAGE: char = '4';
const UPGRADE: char = '5';
const NOOP: char = '6';

const CONNECT: char = '0';
const DISCONNECT: char = '1';
const EVENT: char = '2';
const ACK: char = '3';
const ERROR: char = '4';
const BINARY_EVENT: char = '5';
const BINARY_ACK: char = '6';

/// Encode `message` into one text frame.
///
/// The message's own namespace wins over `namespace`, which is the channel default. `open`,
/// `ping` and `pong` are never namespaced. `close` leaves the whole transport (`1`) unless the
/// message itself names a namespace, which becomes a socket.io disconnect (`41/nsp,`).
pub fn encode(message: &Message, namespace: &str) -> Result<String> {
    let mut frame = String::new();

    match message.kind {
        MessageType::Open => push_text(&mut frame, OPEN, &message.payload),
        MessageType::Close => match message.namespace.as_deref().and_then(normalize_namespace) {
            Some(namespace) => {
                frame.push(MESSAGE);
                frame.push(DISCONNECT);
                push_namespace(&mut frame, namespace);
            }
            None => frame.push(CLOSE),
        },
        MessageType::Ping => push_text(&mut frame, PING, &message.payload),
        MessageType::Pong => push_text(&mut frame, PONG, &message.payload),
        MessageType::Empty | MessageType::Event | MessageType::Ack | MessageType::Error => {
            frame.push(MESSAGE);
            frame.push(socket_code(message.kind));

            let namespace = message
                .namespace
                .as_deref()
                .and_then(normalize_namespace)
                .or_else(|| normalize_namespace(namespace));
            if let Some(namespace) = namespace {
                push_namespace(&mut frame, namespace);
            }

            if let Some(id) = message.ack_id {
                frame.push_str(&id.to_string());
            } else if message.kind == MessageType::Ack {
                return Err(Error::validation("ack message requires an ack id"));
            }

            push_data(&mut frame, message.kind, &message.payload)?;
        }
    }

    Ok(frame)
}

fn push_namespace(frame: &mut String, namespace: &str) {
    if !namespace.starts_with('/') {
        frame.push('/');
    }
    frame.push_str(namespace);
    frame.push(',');
}

const fn socket_code(kind: MessageType) -> char {
    match kind {
        MessageType::Event => EVENT,
        MessageType::Ack => ACK,
        MessageType::Error => ERROR,
        _ => CONNECT,
    }
}

fn push_text(frame: &mut String, code: char, payload: &Payload) {
    frame.push(code);
    if let Payload::Text(text) = payload {
        frame.push_str(text);
    }
}

fn push_data(frame: &mut String, kind: MessageType, payload: &Payload) -> Result<()> {
    match (kind, payload) {
        (MessageType::Event, Payload::Event { name, args }) => {
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            frame.push_str(&serde_json::to_string(&items)?);
        }
        (MessageType::Event, _) => {
            return Err(Error::validation("event message requires an event name"));
        }
        (MessageType::Ack, Payload::Args(args)) => frame.push_str(&serde_json::to_string(args)?),
        (MessageType::Ack, Payload::None) => frame.push_str("[]"),
        (_, Payload::Data(value)) => frame.push_str(&serde_json::to_string(value)?),
        (_, Payload::Text(text)) => frame.push_str(text),
        _ => {}
    }

    Ok(())
}

/// Decode one text frame.
pub fn decode(frame: &str) -> std::result::Result<Message, DecodeError> {
    let mut chars = frame.chars();
    let Some(code) = chars.next() else {
        return Err(DecodeError::Empty);
    };
    let rest = chars.as_str();

    let text = || (!rest.is_empty()).then(|| rest.to_owned());

    match code {
        OPEN => Ok(Message::open(text())),
        CLOSE => Ok(Message::close()),
        PING => Ok(Message::ping(text())),
        PONG => Ok(Message::pong(text())),
        MESSAGE => decode_socket_packet(rest),
        UPGRADE | NOOP => Err(DecodeError::UnsupportedPacket(frame.to_owned())),
        other => Err(DecodeError::UnknownPacketType(other)),
    }
}

fn decode_socket_packet(packet: &str) -> std::result::Result<Message, DecodeError> {
    let mut chars = packet.chars();
    let kind = match chars.next() {
        None => return Err(DecodeError::MissingSocketType),
        Some(CONNECT) => MessageType::Empty,
        Some(DISCONNECT) => MessageType::Close,
        Some(EVENT) => MessageType::Event,
        Some(ACK) => MessageType::Ack,
        Some(ERROR) => MessageType::Error,
        Some(BINARY_EVENT | BINARY_ACK) => {
            return Err(DecodeError::UnsupportedPacket(format!("{MESSAGE}{packet}")));
        }
        Some(other) => return Err(DecodeError::UnknownSocketType(other)),
    };

    let (namespace, rest) = split_namespace(chars.as_str());

    // only events and acks carry an id, error payloads may legitimately start with a digit
    let digits = if matches!(kind, MessageType::Event | MessageType::Ack) {
        rest.find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len())
    } else {
        0
    };
    let (id, data) = rest.split_at(digits);
    let ack_id = if id.is_empty() {
        None
    } else {
        Some(id.parse::<u64>().map_err(DecodeError::InvalidAckId)?)
    };

    let payload = match kind {
        MessageType::Event => {
            let (name, args) = parse_event(data)?;
            Payload::Event { name, args }
        }
        MessageType::Ack => {
            if ack_id.is_none() {
                return Err(DecodeError::MissingAckId);
            }
            match parse_json(data)? {
                None => Payload::Args(Vec::new()),
                Some(Value::Array(args)) => Payload::Args(args),
                Some(other) => Payload::Args(vec![other]),
            }
        }
        MessageType::Error => parse_json(data)?.map_or(Payload::None, Payload::Data),
        // connect may carry a query string, disconnect carries nothing we use
        _ => Payload::None,
    };

    Ok(Message {
        kind,
        namespace: namespace.map(str::to_owned),
        ack_id,
        payload,
    })
}

/// Split a leading `/nsp,` off `packet`. A namespace without a trailing comma runs to the end.
fn split_namespace(packet: &str) -> (Option<&str>, &str) {
    if !packet.starts_with('/') {
        return (None, packet);
    }

    let (namespace, rest) = match packet.find(',') {
        Some(comma) => {
            let (namespace, rest) = packet.split_at(comma);
            (namespace, rest.strip_prefix(',').unwrap_or(rest))
        }
        None => (packet, ""),
    };

    // connect packets may append a query to the namespace
    let namespace = namespace.split('?').next().unwrap_or(namespace);

    (normalize_namespace(namespace), rest)
}

fn parse_json(data: &str) -> std::result::Result<Option<Value>, DecodeError> {
    if data.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(DecodeError::InvalidJson)
}

fn parse_event(data: &str) -> std::result::Result<(String, Vec<Value>), DecodeError> {
    let Some(Value::Array(mut items)) = parse_json(data)? else {
        return Err(DecodeError::InvalidEvent(data.to_owned()));
    };
    if items.is_empty() {
        return Err(DecodeError::InvalidEvent(data.to_owned()));
    }
    let Value::String(name) = items.remove(0) else {
        return Err(DecodeError::InvalidEvent(data.to_owned()));
    };

    Ok((name, items))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn round_trip(message: &Message) {
        let frame = encode(message, "").unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(&decoded, message, "frame {frame:?} did not round trip");
    }

    #[test]
    fn engine_packets_encode_to_single_digit() {
        assert_eq!(encode(&Message::close(), "/chat").unwrap(), "1");
        assert_eq!(encode(&Message::close().in_namespace("/"), "").unwrap(), "1");
        assert_eq!(encode(&Message::ping(None), "/chat").unwrap(), "2");
        assert_eq!(
            encode(&Message::pong(Some("probe".to_owned())), "").unwrap(),
            "3probe"
        );
    }

    #[test]
    fn empty_message_is_connect_packet() {
        assert_eq!(encode(&Message::empty(), "").unwrap(), "40");
        assert_eq!(encode(&Message::empty(), "/").unwrap(), "40");
        assert_eq!(encode(&Message::empty(), "/chat").unwrap(), "40/chat,");
    }

    #[test]
    fn event_encoding_matches_wire_format() {
        let message = Message::event("chat", vec![json!("hello"), json!({"n": 1})]);

        assert_eq!(
            encode(&message, "").unwrap(),
            r#"42["chat","hello",{"n":1}]"#
        );
        assert_eq!(
            encode(&message, "/room").unwrap(),
            r#"42/room,["chat","hello",{"n":1}]"#
        );
    }

    #[test]
    fn namespaced_close_is_socket_disconnect() {
        let message = Message::close().in_namespace("/chat");

        assert_eq!(encode(&message, "").unwrap(), "41/chat,");
        assert_eq!(decode("41/chat,").unwrap(), message);
    }

    #[test]
    fn namespace_without_slash_stays_decodable() {
        let message = Message::event("chat", vec![json!(1)]);

        let frame = encode(&message, "room").unwrap();
        assert_eq!(frame, r#"42/room,["chat",1]"#);
        assert_eq!(decode(&frame).unwrap().namespace.as_deref(), Some("/room"));

        let mut raw = Message::event("chat", vec![]);
        raw.namespace = Some("room".to_owned());
        assert_eq!(encode(&raw, "").unwrap(), r#"42/room,["chat"]"#);
    }

    #[test]
    fn message_namespace_overrides_channel_namespace() {
        let message = Message::event("chat", vec![]).in_namespace("/other");

        assert_eq!(encode(&message, "/room").unwrap(), r#"42/other,["chat"]"#);
    }

    #[test]
    fn ack_request_and_response_carry_ids() {
        assert_eq!(
            encode(&Message::event_with_ack("ask", vec![json!(1)], 12), "").unwrap(),
            r#"4212["ask",1]"#
        );
        assert_eq!(
            encode(&Message::ack(12, vec![json!("ok")]), "/room").unwrap(),
            r#"43/room,12["ok"]"#
        );
    }

    #[test]
    fn ack_without_id_is_rejected() {
        let mut message = Message::ack(1, vec![]);
        message.ack_id = None;

        let err = encode(&message, "").unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Validation);
    }

    #[test]
    fn every_kind_round_trips() {
        round_trip(&Message::open(Some(r#"{"sid":"abc","pingInterval":25000}"#.to_owned())));
        round_trip(&Message::close());
        round_trip(&decode("41/chat,").unwrap());
        round_trip(&Message::close().in_namespace("/chat"));
        round_trip(&Message::event("chat", vec![json!("x")]).in_namespace("room"));
        round_trip(&Message::ping(None));
        round_trip(&Message::ping(Some("probe".to_owned())));
        round_trip(&Message::pong(Some("probe".to_owned())));
        round_trip(&Message::empty());
        round_trip(&Message::empty().in_namespace("/chat"));
        round_trip(&Message::event("chat", vec![]));
        round_trip(&Message::event("chat", vec![json!(null), json!([1, 2]), json!("x,y")]));
        round_trip(&Message::event_with_ack("chat", vec![json!(true)], 42).in_namespace("/a"));
        round_trip(&Message::ack(3, vec![]));
        round_trip(&Message::ack(u64::MAX, vec![json!({"ok": true})]).in_namespace("/b"));
        round_trip(&Message::error(None));
        round_trip(&Message::error(Some(json!("Not authorized"))).in_namespace("/c"));
        round_trip(&Message::error(Some(json!(404))));
    }

    #[test]
    fn decode_handshake() {
        let message = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":60000}"#)
            .unwrap();

        assert_eq!(message.kind, MessageType::Open);
        assert!(message.text_payload().unwrap().contains("\"sid\":\"abc\""));
    }

    #[test]
    fn decode_namespace_disconnect_as_close() {
        let message = decode("41/chat,").unwrap();

        assert_eq!(message.kind, MessageType::Close);
        assert_eq!(message.namespace.as_deref(), Some("/chat"));
    }

    #[test]
    fn decode_connect_with_query_and_no_comma() {
        assert_eq!(
            decode("40/chat?token=1").unwrap().namespace.as_deref(),
            Some("/chat")
        );
        assert_eq!(decode("40/,").unwrap().namespace, None);
    }

    #[test]
    fn decode_ack_with_scalar_payload_wraps_it() {
        let message = decode("437\"done\"").unwrap();

        assert_eq!(message.ack_id, Some(7));
        assert_eq!(message.args(), &[json!("done")]);
    }

    #[test]
    fn decode_errors() {
        assert!(matches!(decode(""), Err(DecodeError::Empty)));
        assert!(decode("").unwrap_err().is_fatal());
        assert!(matches!(decode("9"), Err(DecodeError::UnknownPacketType('9'))));
        assert!(matches!(decode("6"), Err(DecodeError::UnsupportedPacket(_))));
        assert!(matches!(decode("4"), Err(DecodeError::MissingSocketType)));
        assert!(matches!(decode("49"), Err(DecodeError::UnknownSocketType('9'))));
        assert!(matches!(decode("451-[\"x\"]"), Err(DecodeError::UnsupportedPacket(_))));
        assert!(matches!(decode("43[]"), Err(DecodeError::MissingAckId)));
        assert!(matches!(
            decode("4299999999999999999999[\"x\"]"),
            Err(DecodeError::InvalidAckId(_))
        ));
        assert!(matches!(decode("42[\"x\""), Err(DecodeError::InvalidJson(_))));
        assert!(matches!(decode("42{\"x\":1}"), Err(DecodeError::InvalidEvent(_))));
        assert!(matches!(decode("42[1,2]"), Err(DecodeError::InvalidEvent(_))));
        assert!(matches!(decode("42[]"), Err(DecodeError::InvalidEvent(_))));
        assert!(!decode("42[]").unwrap_err().is_fatal());
    }
}
