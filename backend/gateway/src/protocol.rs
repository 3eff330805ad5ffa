//! Line protocol.
//!
//! Every frame is one JSON object on one line. Inbound frames are decoded
//! through an untyped `Value` first so each failure maps to its own
//! [`ProtocolError`] and, from there, to a localized error reply.

use lisa_core::{Catalog, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const SERVER_NAME: &str = "Server";

const LOGIN_REQ: &str = "login req";

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("no type in input JSON")]
    MissingType,
    #[error("unknown input type {0}")]
    UnknownType(String),
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("not logged in")]
    NotLoggedIn,
}

impl ProtocolError {
    /// User-facing text for the `Error` reply.
    pub fn localized(&self, catalog: &Catalog) -> String {
        match self {
            Self::InvalidJson(_) => catalog.tr("error_invalid_json"),
            Self::MissingType => catalog.tr("error_no_type"),
            Self::UnknownType(t) => catalog.tr_with("error_unknown_type", &[("type", t)]),
            Self::UnknownCommand(c) => catalog.tr_with("error_unknown_command", &[("command", c)]),
            Self::MissingField(f) => catalog.tr_with("error_missing_field", &[("field", f)]),
            Self::NotLoggedIn => catalog.tr("error_not_logged_in"),
        }
    }
}

/// Chat payload as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub body: Option<String>,
    /// Pre-decoded outcome; skips the NLU call when present.
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

impl ChatRequest {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            outcome: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    LoginRequest { from: String, zone: String },
    Chat(ChatRequest),
}

/// Decode one inbound line.
pub fn decode_line(line: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(line.trim()).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ProtocolError::InvalidJson("expected a JSON object".into()));
    };
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    match kind.to_ascii_lowercase().as_str() {
        "chat" => serde_json::from_value(Value::Object(obj))
            .map(ClientMessage::Chat)
            .map_err(|e| ProtocolError::InvalidJson(e.to_string())),
        "command" => decode_command(&obj),
        _ => Err(ProtocolError::UnknownType(kind)),
    }
}

fn decode_command(obj: &Map<String, Value>) -> Result<ClientMessage, ProtocolError> {
    let command = obj
        .get("command")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("command"))?;
    if !command.eq_ignore_ascii_case(LOGIN_REQ) {
        return Err(ProtocolError::UnknownCommand(command.to_string()));
    }
    let field = |name: &'static str| {
        obj.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ProtocolError::MissingField(name))
    };
    Ok(ClientMessage::LoginRequest {
        from: field("from")?,
        zone: field("zone")?,
    })
}

/// Payload written to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "chat")]
    Chat { message: String },
    #[serde(rename = "command")]
    Command(ServerCommand),
    #[serde(rename = "Error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn chat(message: impl Into<String>) -> Self {
        Self::Chat {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn ask(message: impl Into<String>, nlu_context: Option<Value>) -> Self {
        Self::Command(ServerCommand::Ask {
            message: message.into(),
            nlu_context,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command")]
pub enum ServerCommand {
    #[serde(rename = "login ack")]
    LoginAck { bot_name: String },
    /// Question: the client should listen for an answer.
    #[serde(rename = "ask")]
    Ask {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        nlu_context: Option<Value>,
    },
    /// Question closed: back to keyword spotting.
    #[serde(rename = "kws")]
    Kws,
    #[serde(rename = "mute")]
    Mute,
}

/// A payload plus its addressing envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub message: ServerMessage,
    pub to: Option<String>,
    pub zone: Option<String>,
}

impl OutboundFrame {
    /// Frame for a connection that has not logged in yet.
    pub fn unaddressed(message: ServerMessage) -> Self {
        Self {
            message,
            to: None,
            zone: None,
        }
    }

    pub fn addressed(message: ServerMessage, to: &str, zone: &str) -> Self {
        Self {
            message,
            to: Some(to.to_string()),
            zone: Some(zone.to_string()),
        }
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(&self.message)?;
        if let Value::Object(map) = &mut value {
            map.insert("from".into(), Value::String(SERVER_NAME.into()));
            if let Some(to) = &self.to {
                map.insert("to".into(), Value::String(to.clone()));
            }
            if let Some(zone) = &self.zone {
                map.insert("zone".into(), Value::String(zone.clone()));
            }
        }
        Ok(value)
    }

    /// Serialized line, without the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        self.to_value().map(|v| v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_decode_login() {
        let msg = decode_line(r#"{"type":"command","command":"LOGIN REQ","from":"A","zone":"Z"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::LoginRequest {
                from: "A".into(),
                zone: "Z".into()
            }
        );
    }

    #[test]
    fn test_decode_chat_with_outcome() {
        let msg = decode_line(
            r#"{"type":"chat","body":"lights off","outcome":{"intent":"lights_off","confidence":0.9}}"#,
        )
        .unwrap();
        let ClientMessage::Chat(chat) = msg else {
            panic!("expected chat");
        };
        assert_eq!(chat.body.as_deref(), Some("lights off"));
        assert_eq!(chat.outcome.unwrap().intent.as_deref(), Some("lights_off"));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_line("not json"), Err(ProtocolError::InvalidJson(_))));
        assert!(matches!(decode_line("[1,2]"), Err(ProtocolError::InvalidJson(_))));
        assert_eq!(decode_line(r#"{"body":"x"}"#), Err(ProtocolError::MissingType));
        assert_eq!(
            decode_line(r#"{"type":"shout"}"#),
            Err(ProtocolError::UnknownType("shout".into()))
        );
        assert_eq!(
            decode_line(r#"{"type":"command","command":"reboot"}"#),
            Err(ProtocolError::UnknownCommand("reboot".into()))
        );
        assert_eq!(
            decode_line(r#"{"type":"command","command":"login req","from":"A"}"#),
            Err(ProtocolError::MissingField("zone"))
        );
    }

    #[test]
    fn test_localized_errors() {
        let catalog = Catalog::new("en", &HashMap::new());
        assert_eq!(
            ProtocolError::UnknownType("shout".into()).localized(&catalog),
            "Error: unknown input type shout"
        );
        assert_eq!(ProtocolError::MissingType.localized(&catalog), "Error: no type in input JSON");
    }

    #[test]
    fn test_outbound_wire_shapes() {
        let ack = OutboundFrame::addressed(
            ServerMessage::Command(ServerCommand::LoginAck {
                bot_name: "Lisa".into(),
            }),
            "A",
            "Z",
        );
        assert_eq!(
            ack.to_value().unwrap(),
            json!({"type":"command","command":"login ack","bot_name":"Lisa","from":"Server","to":"A","zone":"Z"})
        );

        let ask = OutboundFrame::addressed(ServerMessage::ask("Which room?", None), "A", "Z");
        assert_eq!(
            ask.to_value().unwrap(),
            json!({"type":"command","command":"ask","message":"Which room?","from":"Server","to":"A","zone":"Z"})
        );

        let err = OutboundFrame::unaddressed(ServerMessage::error("Error: invalid JSON"));
        assert_eq!(
            err.to_value().unwrap(),
            json!({"type":"Error","message":"Error: invalid JSON","from":"Server"})
        );

        let kws = OutboundFrame::unaddressed(ServerMessage::Command(ServerCommand::Kws));
        assert_eq!(kws.to_value().unwrap()["command"], "kws");
    }
}
