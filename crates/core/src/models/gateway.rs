//! Gateway frame models
//!
//! Inbound frames are `{ "t": type, "d": payload, "s"?: sequence }`.
//! Outbound control frames are `{ "op": operation, "d": data }`.

use super::message::{Message, MessageDeletePayload, MessageUpdatePayload};
use crate::errors::{Error, Result};
use crate::types::{ChannelId, MessageId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event type names pushed by the gateway
pub mod event_types {
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    pub const MESSAGE_UPDATE: &str = "MESSAGE_UPDATE";
    pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";

    pub const TYPING_START: &str = "TYPING_START";

    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
    pub const CHANNEL_UPDATE: &str = "CHANNEL_UPDATE";
    pub const CHANNEL_DELETE: &str = "CHANNEL_DELETE";

    pub const SERVER_CREATE: &str = "SERVER_CREATE";
    pub const SERVER_UPDATE: &str = "SERVER_UPDATE";
    pub const SERVER_DELETE: &str = "SERVER_DELETE";
    pub const SERVER_MEMBER_ADD: &str = "SERVER_MEMBER_ADD";
    pub const SERVER_MEMBER_REMOVE: &str = "SERVER_MEMBER_REMOVE";

    pub const THREAD_CREATE: &str = "THREAD_CREATE";
    pub const THREAD_UPDATE: &str = "THREAD_UPDATE";

    pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
    pub const VOICE_SERVER_INFO: &str = "VOICE_SERVER_INFO";

    pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";
}

/// Control operations a client may send
pub mod operations {
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
}

/// One decoded inbound gateway frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "t")]
    pub event_type: String,
    #[serde(rename = "d")]
    pub payload: Value,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
}

impl GatewayEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            sequence: None,
        }
    }

    /// Decode a text frame. Anything that is not a JSON object with a string
    /// `t` and a `d` field is rejected.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Deserialize the payload into a concrete type
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(|e| {
            Error::Protocol(format!("{} payload: {}", self.event_type, e))
        })
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

/// Typed view of the message events the client consumes
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEvent {
    Create(Message),
    Update { id: MessageId, content: String },
    Delete { id: MessageId },
}

impl MessageEvent {
    /// Interpret a gateway event.
    ///
    /// Returns `Ok(None)` for event types that are not message events and an
    /// error when a message event carries a payload of the wrong shape.
    pub fn parse(event: &GatewayEvent) -> Result<Option<Self>> {
        let parsed = match event.event_type.as_str() {
            event_types::MESSAGE_CREATE => MessageEvent::Create(event.payload_as::<Message>()?),
            event_types::MESSAGE_UPDATE => {
                let MessageUpdatePayload { id, content } = event.payload_as()?;
                MessageEvent::Update { id, content }
            }
            event_types::MESSAGE_DELETE => {
                let MessageDeletePayload { id } = event.payload_as()?;
                MessageEvent::Delete { id }
            }
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

/// Control frame written to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(rename = "op")]
    pub operation: String,
    #[serde(rename = "d")]
    pub data: Value,
}

impl OutboundFrame {
    pub fn subscribe(channel_id: &ChannelId) -> Self {
        Self {
            operation: operations::SUBSCRIBE.to_string(),
            data: json!({ "channel_id": channel_id }),
        }
    }

    pub fn unsubscribe(channel_id: &ChannelId) -> Self {
        Self {
            operation: operations::UNSUBSCRIBE.to_string(),
            data: json!({ "channel_id": channel_id }),
        }
    }

    /// Channel the frame targets, if it carries one
    pub fn channel_id(&self) -> Option<&str> {
        self.data.get("channel_id").and_then(Value::as_str)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_event_with_sequence() {
        let event =
            GatewayEvent::decode(r#"{"t":"MESSAGE_DELETE","d":{"id":"m1"},"s":"7"}"#).unwrap();
        assert!(event.is(event_types::MESSAGE_DELETE));
        assert_eq!(event.sequence.as_deref(), Some("7"));
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(GatewayEvent::decode("not json").is_err());
        assert!(GatewayEvent::decode(r#"{"d":{}}"#).is_err());
        assert!(GatewayEvent::decode(r#"{"t":42,"d":{}}"#).is_err());
        assert!(GatewayEvent::decode(r#"{"t":"MESSAGE_CREATE"}"#).is_err());
        assert!(GatewayEvent::decode(r#"["MESSAGE_CREATE"]"#).is_err());
    }

    #[test]
    fn test_unknown_event_type_decodes() {
        let event =
            GatewayEvent::decode(r#"{"t":"PRESENCE_UPDATE","d":{"status":"away"}}"#).unwrap();
        assert_eq!(MessageEvent::parse(&event).unwrap(), None);
    }

    #[test]
    fn test_parse_update_and_delete() {
        let update =
            GatewayEvent::decode(r#"{"t":"MESSAGE_UPDATE","d":{"id":"m1","content":"hi there"}}"#)
                .unwrap();
        assert_eq!(
            MessageEvent::parse(&update).unwrap(),
            Some(MessageEvent::Update {
                id: MessageId::from("m1"),
                content: "hi there".to_string(),
            })
        );

        let bad = GatewayEvent::new(event_types::MESSAGE_DELETE, json!({ "content": "x" }));
        assert!(MessageEvent::parse(&bad).is_err());
    }

    #[test]
    fn test_subscribe_frame_wire_format() {
        let frame = OutboundFrame::subscribe(&ChannelId::from("general"));
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value, json!({ "op": "SUBSCRIBE", "d": { "channel_id": "general" } }));
        assert_eq!(
            OutboundFrame::unsubscribe(&ChannelId::from("random")).channel_id(),
            Some("random")
        );
    }
}
