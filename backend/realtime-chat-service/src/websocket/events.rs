//! WebSocket wire format: `{"event": "<name>", "data": {...}}`.

use crate::models::{ConversationSummary, MessageStatus, MessageView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSeenPayload {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeliveredPayload {
    pub message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChatPayload {
    pub conversation_id: Uuid,
}

/// Client -> server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Typing(TypingPayload),
    MessageSeen(MessageSeenPayload),
    MessageDelivered(MessageDeliveredPayload),
    JoinChat(JoinChatPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Typing(_) => "typing",
            ClientEvent::MessageSeen(_) => "messageSeen",
            ClientEvent::MessageDelivered(_) => "messageDelivered",
            ClientEvent::JoinChat(_) => "joinChat",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingPayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub conversation_id: Uuid,
    pub message_ids: Vec<Uuid>,
    pub read_by: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdatePayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub reason: String,
}

/// Server -> client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(MessageView),
    UserTyping(UserTypingPayload),
    MessageRead(MessageReadPayload),
    MessageDeliveryUpdate(DeliveryUpdatePayload),
    MessageDeleted(MessageDeletedPayload),
    MessageEdited(MessageView),
    UserOnline(PresencePayload),
    UserOffline(PresencePayload),
    NewChatCreated(ConversationSummary),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(reason: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            reason: reason.into(),
        })
    }

    /// JSON frame, or None if the payload cannot be serialized
    pub fn to_frame(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize server event");
                None
            }
        }
    }
}
