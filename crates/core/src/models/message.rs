//! Message models

use crate::types::{ChannelId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as delivered by the REST API and the gateway.
///
/// Field names are camelCase on the wire; the snake_case spelling used by
/// the REST API is accepted as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(alias = "channel_id")]
    pub channel_id: ChannelId,
    #[serde(alias = "author_id")]
    pub author_id: UserId,
    pub content: String,
    #[serde(default, alias = "thread_id", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<MessageId>,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "edited_at", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether the message has been edited since creation
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }
}

/// Payload of a `MESSAGE_UPDATE` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdatePayload {
    pub id: MessageId,
    pub content: String,
}

/// Payload of a `MESSAGE_DELETE` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeletePayload {
    pub id: MessageId,
}

/// Request body for posting a new message
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub content: String,
}
