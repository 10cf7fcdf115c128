use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Body shown for messages deleted for everyone
pub const DELETED_MESSAGE_TEXT: &str = "This message was deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::File => "file",
        }
    }

    /// Classify an uploaded file by its MIME type
    pub fn from_mime(content_type: &mime::Mime) -> Self {
        let top = content_type.type_();
        if top == mime::IMAGE {
            MessageKind::Image
        } else if top == mime::VIDEO {
            MessageKind::Video
        } else {
            MessageKind::File
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub user_id: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Persisted body.
///
/// Text: hex ciphertext with hex nonce and tag. Media: plaintext URL.
/// Text with neither nonce nor tag is legacy plaintext; with only one of
/// them it is corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBody {
    pub content: String,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub auth_tag: Option<String>,
}

impl StoredBody {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            nonce: None,
            auth_tag: None,
        }
    }
}

/// Message document. Status is never stored; see [`Message::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    #[serde(default)]
    pub system: bool,
    pub body: StoredBody,
    pub reply_to: Option<Uuid>,
    pub media: Option<MediaMetadata>,
    pub client_message_id: Option<String>,
    pub delivered_to: Vec<Receipt>,
    pub read_by: Vec<Receipt>,
    pub deleted_for: BTreeSet<Uuid>,
    pub deleted_for_everyone: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    pub fn is_delivered_to(&self, user_id: Uuid) -> bool {
        self.delivered_to.iter().any(|r| r.user_id == user_id)
    }

    pub fn is_hidden_for(&self, user_id: Uuid) -> bool {
        self.deleted_for.contains(&user_id)
    }

    /// Returns true if a new receipt was added
    pub fn add_delivered(&mut self, user_id: Uuid, at: DateTime<Utc>) -> bool {
        if user_id == self.sender_id || self.is_delivered_to(user_id) {
            return false;
        }
        self.delivered_to.push(Receipt { user_id, at });
        true
    }

    /// Returns true if a new read receipt was added. Reading implies delivery.
    pub fn add_read(&mut self, user_id: Uuid, at: DateTime<Utc>) -> bool {
        if user_id == self.sender_id || self.is_read_by(user_id) {
            return false;
        }
        self.add_delivered(user_id, at);
        self.read_by.push(Receipt { user_id, at });
        true
    }

    /// Status projection over the current participant list.
    pub fn status(&self, participants: &[Uuid]) -> MessageStatus {
        let mut others = participants.iter().filter(|p| **p != self.sender_id).peekable();
        if others.peek().is_some() && others.all(|p| self.is_read_by(*p)) {
            MessageStatus::Read
        } else if !self.delivered_to.is_empty() {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        }
    }

    pub fn delete_for_everyone(&mut self, at: DateTime<Utc>) {
        self.deleted_for_everyone = true;
        self.deleted_at = Some(at);
        self.body = StoredBody::plain(DELETED_MESSAGE_TEXT);
        self.media = None;
    }
}

/// Message as returned to clients: decrypted body plus projected status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageKind,
    pub system: bool,
    pub content: String,
    pub reply_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    pub status: MessageStatus,
    pub delivered_to: Vec<Receipt>,
    pub read_by: Vec<Receipt>,
    pub deleted_for_everyone: bool,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: &Message, content: String, participants: &[Uuid]) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            message_type: message.kind,
            system: message.system,
            content,
            reply_to: message.reply_to,
            media: message.media.clone(),
            client_message_id: message.client_message_id.clone(),
            status: message.status(participants),
            delivered_to: message.delivered_to.clone(),
            read_by: message.read_by.clone(),
            deleted_for_everyone: message.deleted_for_everyone,
            edited: message.edited,
            edited_at: message.edited_at,
            created_at: message.created_at,
        }
    }
}
