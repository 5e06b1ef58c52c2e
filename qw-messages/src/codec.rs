//! Deterministic wire codec (spec.md §4.A).
//!
//! `Envelope` and `Reply` are `bincode`-encoded, the same crate the
//! teacher uses for its own wire format. Control requests/replies are
//! `serde_json`-encoded textual JSON instead, as spec.md §6 requires for
//! the health/pong path.

use crate::envelope::ControlReply;
use crate::envelope::Envelope;
use crate::envelope::Reply;
use crate::error::CodecError;

pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(envelope).map_err(|err| CodecError::Encode(err.to_string()))
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    bincode::deserialize(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}

/// Decodes a request that may either be a `bincode`-encoded [`Envelope`]
/// or a bare UTF-8 control string (spec.md §6: "the literal UTF-8 string
/// `health` or any other short string for control"). Falls back to a
/// decode error only when neither shape applies (spec.md §7, §8 S5).
pub fn decode_request(bytes: &[u8]) -> Result<Envelope, CodecError> {
    if let Ok(envelope) = decode_envelope(bytes) {
        return Ok(envelope);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.is_empty() => Ok(Envelope::Control(text.to_string())),
        _ => Err(CodecError::Decode(
            "No Valid Function was sent to Worker".to_string(),
        )),
    }
}

pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(reply).map_err(|err| CodecError::Encode(err.to_string()))
}

pub fn decode_reply(bytes: &[u8]) -> Result<Reply, CodecError> {
    bincode::deserialize(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}

pub fn encode_control_reply(reply: &ControlReply) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(reply).map_err(|err| CodecError::Encode(err.to_string()))
}

pub fn decode_control_reply(bytes: &[u8]) -> Result<ControlReply, CodecError> {
    serde_json::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use uuid::Uuid;

    use super::*;
    use crate::envelope::FuncCall;
    use crate::envelope::QueueCall;
    use crate::envelope::QueueStatus;
    use crate::envelope::WorkerStatus;
    use crate::value::ArgValue;

    #[test]
    fn envelope_round_trips() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("seconds".to_string(), ArgValue::Int(2));
        let envelope = Envelope::Queue(QueueCall {
            call: FuncCall {
                handler_id: "sleep_and_return".to_string(),
                args: vec![ArgValue::Str("ok".to_string())],
                kwargs,
                debug: false,
                correlation_id: Some(Uuid::new_v4()),
            },
            queued: false,
        });

        let bytes = encode_envelope(&envelope).unwrap();
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn encoding_is_deterministic() {
        let envelope = Envelope::Func(FuncCall::new(
            "echo",
            vec![ArgValue::Int(41)],
        ));
        assert_eq!(
            encode_envelope(&envelope).unwrap(),
            encode_envelope(&envelope).unwrap()
        );
    }

    #[test]
    fn reply_distinguishes_exception_from_value() {
        let value = Reply::Value(ArgValue::Int(42));
        let exception = Reply::exception("ValueError", "boom");

        let value_bytes = encode_reply(&value).unwrap();
        let exception_bytes = encode_reply(&exception).unwrap();

        assert_eq!(decode_reply(&value_bytes).unwrap(), value);
        match decode_reply(&exception_bytes).unwrap() {
            Reply::Exception { type_tag, message } => {
                assert_eq!(type_tag, "ValueError");
                assert_eq!(message, "boom");
            },
            other => panic!("expected an exception reply, got {other:?}"),
        }
    }

    #[test]
    fn decode_failure_is_reported_not_panicking() {
        let err = decode_envelope(b"not a valid envelope").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn control_reply_is_textual_json() {
        let health = ControlReply::Health {
            queue: QueueStatus {
                size: 1,
                full: false,
                empty: false,
                consumers: 4,
            },
            worker: WorkerStatus {
                name: "qw-8181_0".to_string(),
                serving: vec!["127.0.0.1:8181".to_string()],
            },
        };
        let bytes = encode_control_reply(&health).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"queue\""));
        assert!(text.contains("\"worker\""));
        assert_eq!(decode_control_reply(&bytes).unwrap(), health);
    }

    #[test]
    fn decode_request_accepts_bare_control_strings() {
        let envelope = decode_request(b"health").unwrap();
        assert_eq!(envelope, Envelope::Control("health".to_string()));
    }

    #[test]
    fn decode_request_prefers_structured_envelope() {
        let envelope = Envelope::Func(FuncCall::new("echo", vec![ArgValue::Int(1)]));
        let bytes = encode_envelope(&envelope).unwrap();
        assert_eq!(decode_request(&bytes).unwrap(), envelope);
    }

    #[test]
    fn decode_request_rejects_garbage_binary() {
        let garbage = [0xff_u8, 0xfe, 0x00, 0x01, 0xd8, 0x00];
        assert!(decode_request(&garbage).is_err());
    }
}
