//! Wire envelopes for the local socket.
//!
//! Handshake messages and RPC replies share one channel. Inbound frames are
//! decoded as a handshake tag first and as an RPC reply otherwise.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BridgeError;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub id: &'a str,
    pub method: &'a str,
    pub params: &'a Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeMessage {
    Nonce { nonce: String },
    AuthOk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeResponse {
    Auth { hmac: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    pub id: String,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl RpcReply {
    /// An `error` field always wins over `result`.
    pub fn into_outcome(self) -> Result<Value, BridgeError> {
        match self.error {
            Some(Value::String(message)) => Err(BridgeError::remote(message)),
            Some(other) => Err(BridgeError::remote(other.to_string())),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Handshake(HandshakeMessage),
    Reply(RpcReply),
    Unrecognized(Value),
}

pub fn encode_request(id: &str, method: &str, params: &Value) -> Result<String, BridgeError> {
    frame(&RpcRequest { id, method, params })
}

pub fn encode_handshake(response: &HandshakeResponse) -> Result<String, BridgeError> {
    frame(response)
}

fn frame<T: Serialize>(message: &T) -> Result<String, BridgeError> {
    let mut line = serde_json::to_string(message)
        .map_err(|err| BridgeError::protocol(format!("failed to encode frame: {err}")))?;
    line.push('\n');
    Ok(line)
}

pub fn decode_inbound(line: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Ok(Inbound::Unrecognized(value));
    }

    if let Ok(handshake) = serde_json::from_value::<HandshakeMessage>(value.clone()) {
        return Ok(Inbound::Handshake(handshake));
    }

    let Some(id) = value.get("id").and_then(reply_id) else {
        return Ok(Inbound::Unrecognized(value));
    };

    Ok(Inbound::Reply(RpcReply {
        id,
        result: value.get("result").cloned(),
        error: value.get("error").filter(|error| !error.is_null()).cloned(),
    }))
}

fn reply_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_handshake_tags_before_replies() {
        let nonce = decode_inbound(r#"{"type":"nonce","nonce":"abc123"}"#).expect("decode");
        assert_eq!(
            nonce,
            Inbound::Handshake(HandshakeMessage::Nonce {
                nonce: "abc123".to_string()
            })
        );

        let ok = decode_inbound(r#"{"type":"auth_ok"}"#).expect("decode");
        assert_eq!(ok, Inbound::Handshake(HandshakeMessage::AuthOk));
    }

    #[test]
    fn decodes_reply_and_normalizes_numeric_id() {
        let reply = decode_inbound(r#"{"id":7,"result":{"ok":true}}"#).expect("decode");
        let Inbound::Reply(reply) = reply else {
            panic!("expected reply");
        };
        assert_eq!(reply.id, "7");
        assert_eq!(reply.into_outcome(), Ok(json!({"ok": true})));
    }

    #[test]
    fn error_field_rejects_even_with_result() {
        let reply = decode_inbound(r#"{"id":"1","result":1,"error":"boom"}"#).expect("decode");
        let Inbound::Reply(reply) = reply else {
            panic!("expected reply");
        };
        assert_eq!(reply.into_outcome(), Err(BridgeError::remote("boom")));
    }

    #[test]
    fn structured_error_is_kept_as_json_text() {
        let reply =
            decode_inbound(r#"{"id":"2","error":{"code":"schema_outdated"}}"#).expect("decode");
        let Inbound::Reply(reply) = reply else {
            panic!("expected reply");
        };
        let err = reply.into_outcome().expect_err("structured error");
        assert_eq!(err, BridgeError::remote(r#"{"code":"schema_outdated"}"#));
    }

    #[test]
    fn null_error_resolves() {
        let reply = decode_inbound(r#"{"id":"3","error":null}"#).expect("decode");
        let Inbound::Reply(reply) = reply else {
            panic!("expected reply");
        };
        assert_eq!(reply.into_outcome(), Ok(serde_json::Value::Null));
    }

    #[test]
    fn frames_without_tag_or_id_are_unrecognized() {
        let inbound = decode_inbound(r#"{"type":"hello"}"#).expect("decode");
        assert!(matches!(inbound, Inbound::Unrecognized(_)));
        assert!(decode_inbound("{not json").is_err());
    }

    #[test]
    fn non_object_frames_are_unrecognized() {
        for frame in ["42", r#""x""#, "[]", "null", r#"["auth_ok"]"#] {
            let inbound = decode_inbound(frame).expect("valid json");
            assert!(
                matches!(inbound, Inbound::Unrecognized(_)),
                "{frame} should be unrecognized"
            );
        }
    }

    #[test]
    fn encodes_newline_terminated_frames() {
        let line = encode_request("1", "echo", &json!({"text": "hi"})).expect("encode");
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
        assert_eq!(
            value,
            json!({"id": "1", "method": "echo", "params": {"text": "hi"}})
        );

        let auth = encode_handshake(&HandshakeResponse::Auth {
            hmac: "sig".to_string(),
        })
        .expect("encode");
        assert_eq!(auth, "{\"type\":\"auth\",\"hmac\":\"sig\"}\n");
    }
}
