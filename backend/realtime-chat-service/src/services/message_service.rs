use crate::error::{AppError, AppResult};
use crate::metrics::MESSAGES_SENT_TOTAL;
use crate::models::{
    Conversation, MediaMetadata, Message, MessageKind, MessageView, StoredBody,
};
use crate::services::cipher::{MessageCipher, UNDECRYPTABLE_PLACEHOLDER};
use crate::services::conversation_service::member_conversation;
use crate::services::repository::{self, ChatRepository};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Client-supplied content of a new message
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub kind: MessageKind,
    /// Plaintext for text messages, media URL otherwise
    pub content: String,
    pub reply_to: Option<Uuid>,
    pub media: Option<MediaMetadata>,
    pub client_message_id: Option<String>,
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: content.into(),
            reply_to: None,
            media: None,
            client_message_id: None,
        }
    }

    pub fn media(kind: MessageKind, url: String, media: MediaMetadata) -> Self {
        Self {
            kind,
            content: url,
            reply_to: None,
            media: Some(media),
            client_message_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub message: MessageView,
    /// Conversation state after the append
    pub conversation: Conversation,
    /// True when a resend matched an already stored client message id
    pub duplicate: bool,
}

#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<MessageView>,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub message: Message,
    pub participants: Vec<Uuid>,
    /// False when the user had already acknowledged the message
    pub added: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub for_everyone: bool,
}

/// Message lifecycle: append, read, receipts, edit, delete, search.
pub struct MessageService {
    repo: Arc<dyn ChatRepository>,
    cipher: Arc<MessageCipher>,
}

impl MessageService {
    pub fn new(repo: Arc<dyn ChatRepository>, cipher: Arc<MessageCipher>) -> Self {
        Self { repo, cipher }
    }

    /// Append a user message. Text bodies are encrypted before they reach
    /// the repository.
    pub async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        draft: MessageDraft,
    ) -> AppResult<AppendOutcome> {
        member_conversation(self.repo.as_ref(), conversation_id, sender_id).await?;

        if draft.content.trim().is_empty() {
            return Err(AppError::Validation(match draft.kind {
                MessageKind::Text => "message content must not be empty".into(),
                _ => "media URL must not be empty".into(),
            }));
        }

        if let Some(reply_to) = draft.reply_to {
            self.ensure_reply_target(conversation_id, reply_to).await?;
        }

        self.insert(conversation_id, sender_id, draft, false).await
    }

    /// `Validation` unless `reply_to` is a message of the same conversation
    pub async fn ensure_reply_target(&self, conversation_id: Uuid, reply_to: Uuid) -> AppResult<()> {
        let parent = self.repo.get_message(reply_to).await?;
        if parent.map(|m| m.conversation_id) != Some(conversation_id) {
            return Err(AppError::Validation(
                "replyTo must reference a message in the same conversation".into(),
            ));
        }
        Ok(())
    }

    /// Append a synthetic notice such as "X left the group". `actor` need
    /// not be a current participant.
    pub async fn append_system(
        &self,
        conversation_id: Uuid,
        actor: Uuid,
        text: String,
    ) -> AppResult<AppendOutcome> {
        self.insert(conversation_id, actor, MessageDraft::text(text), true)
            .await
    }

    async fn insert(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        draft: MessageDraft,
        system: bool,
    ) -> AppResult<AppendOutcome> {
        let body = match draft.kind {
            MessageKind::Text => self
                .cipher
                .seal(&draft.content)
                .map_err(|e| AppError::Internal(e.to_string()))?,
            _ => StoredBody::plain(draft.content.clone()),
        };

        let message_id = Uuid::new_v4();
        let now = Utc::now();
        let MessageDraft {
            kind,
            content,
            reply_to,
            media,
            client_message_id,
        } = draft;

        // Everything below runs under the conversation lock
        let stored = self
            .repo
            .append_message(
                conversation_id,
                Box::new(move |c: &mut Conversation| {
                    if !c.active {
                        return Err(AppError::NotFound("conversation"));
                    }
                    if !system && !c.is_participant(sender_id) {
                        return Err(AppError::NotParticipant);
                    }
                    let created_at = c.next_message_time(now);
                    c.record_message(message_id, sender_id, created_at);
                    Ok(Message {
                        id: message_id,
                        conversation_id,
                        sender_id,
                        kind,
                        system,
                        body,
                        reply_to,
                        media,
                        client_message_id,
                        delivered_to: Vec::new(),
                        read_by: Vec::new(),
                        deleted_for: BTreeSet::new(),
                        deleted_for_everyone: false,
                        deleted_at: None,
                        edited: false,
                        edited_at: None,
                        created_at,
                    })
                }),
            )
            .await?;

        let (message, conversation) = match stored {
            repository::AppendOutcome::Inserted {
                message,
                conversation,
            } => (message, conversation),
            repository::AppendOutcome::Duplicate {
                message,
                conversation,
            } => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    "duplicate client message id, returning stored message"
                );
                return Ok(AppendOutcome {
                    message: self.view(&message, &conversation.participants),
                    conversation,
                    duplicate: true,
                });
            }
        };

        MESSAGES_SENT_TOTAL
            .with_label_values(&[if system { "system" } else { message.kind.as_str() }])
            .inc();
        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %message_id,
            sender_id = %sender_id,
            kind = message.kind.as_str(),
            "message appended"
        );

        Ok(AppendOutcome {
            message: MessageView::new(&message, content, &conversation.participants),
            conversation,
            duplicate: false,
        })
    }

    /// Client view with the body decrypted and status projected
    pub fn view(&self, message: &Message, participants: &[Uuid]) -> MessageView {
        let content = match message.kind {
            MessageKind::Text => self.cipher.open(&message.body),
            _ => message.body.content.clone(),
        };
        MessageView::new(message, content, participants)
    }

    pub async fn get(&self, message_id: Uuid) -> AppResult<Message> {
        self.repo
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }

    /// Page `page` (1-based) of `limit` messages counted from the newest,
    /// returned oldest first.
    pub async fn history(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> AppResult<HistoryPage> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page < 1 {
            return Err(AppError::Validation("page must be at least 1".into()));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }

        let conversation = member_conversation(self.repo.as_ref(), conversation_id, user_id).await?;
        let offset = (page as usize - 1) * limit as usize;
        let mut messages = self
            .repo
            .list_messages(conversation_id, user_id, offset, limit as usize + 1)
            .await?;

        let has_more = messages.len() > limit as usize;
        messages.truncate(limit as usize);
        messages.reverse();

        Ok(HistoryPage {
            messages: messages
                .iter()
                .map(|m| self.view(m, &conversation.participants))
                .collect(),
            page,
            limit,
            has_more,
        })
    }

    /// Case-insensitive substring search over decrypted text, newest first.
    /// Linear in the size of the conversation.
    pub async fn search(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        query: &str,
    ) -> AppResult<Vec<MessageView>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(AppError::Validation("search query must not be empty".into()));
        }

        let conversation = member_conversation(self.repo.as_ref(), conversation_id, user_id).await?;
        let candidates = self.repo.text_messages(conversation_id).await?;

        Ok(candidates
            .iter()
            .filter(|m| !m.deleted_for_everyone && !m.is_hidden_for(user_id))
            .filter_map(|m| {
                let text = self.cipher.open(&m.body);
                (text != UNDECRYPTABLE_PLACEHOLDER && text.to_lowercase().contains(&needle))
                    .then(|| MessageView::new(m, text, &conversation.participants))
            })
            .collect())
    }

    pub async fn edit(
        &self,
        message_id: Uuid,
        editor_id: Uuid,
        new_content: &str,
    ) -> AppResult<MessageView> {
        if new_content.trim().is_empty() {
            return Err(AppError::Validation("message content must not be empty".into()));
        }
        let body = self
            .cipher
            .seal(new_content)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let now = Utc::now();

        let message = self
            .repo
            .update_message(
                message_id,
                Box::new(move |m: &mut Message| {
                    if m.sender_id != editor_id {
                        return Err(AppError::Forbidden(
                            "only the sender can edit a message".into(),
                        ));
                    }
                    if m.system {
                        return Err(AppError::EditNotAllowed(
                            "system messages cannot be edited".into(),
                        ));
                    }
                    if m.kind != MessageKind::Text {
                        return Err(AppError::EditNotAllowed("only text messages can be edited".into()));
                    }
                    if m.deleted_for_everyone {
                        return Err(AppError::EditNotAllowed("message was deleted".into()));
                    }
                    m.body = body;
                    m.edited = true;
                    m.edited_at = Some(now);
                    Ok(())
                }),
            )
            .await?;

        let participants = self.participants_of(message.conversation_id).await?;
        tracing::info!(message_id = %message_id, "message edited");
        Ok(MessageView::new(&message, new_content.to_string(), &participants))
    }

    pub async fn delete(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        for_everyone: bool,
    ) -> AppResult<DeleteOutcome> {
        let existing = self.get(message_id).await?;
        if !for_everyone && existing.sender_id != user_id {
            let participants = self.participants_of(existing.conversation_id).await?;
            if !participants.contains(&user_id) {
                return Err(AppError::NotParticipant);
            }
        }

        let now = Utc::now();
        let message = self
            .repo
            .update_message(
                message_id,
                Box::new(move |m: &mut Message| {
                    if for_everyone {
                        if m.system {
                            return Err(AppError::Forbidden(
                                "system messages cannot be deleted for everyone".into(),
                            ));
                        }
                        if m.sender_id != user_id {
                            return Err(AppError::Forbidden(
                                "only the sender can delete for everyone".into(),
                            ));
                        }
                        if !m.deleted_for_everyone {
                            m.delete_for_everyone(now);
                        }
                    } else {
                        m.deleted_for.insert(user_id);
                    }
                    Ok(())
                }),
            )
            .await?;

        tracing::info!(message_id = %message_id, for_everyone, "message deleted");
        Ok(DeleteOutcome {
            message_id,
            conversation_id: message.conversation_id,
            for_everyone,
        })
    }

    pub async fn mark_delivered(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<DeliveryReceipt> {
        let existing = self.get(message_id).await?;
        if existing.sender_id == user_id {
            return Err(AppError::Validation(
                "sender cannot acknowledge delivery of their own message".into(),
            ));
        }
        let conversation =
            member_conversation(self.repo.as_ref(), existing.conversation_id, user_id).await?;

        let now = Utc::now();
        let mut added = false;
        let flag = &mut added;
        let message = self
            .repo
            .update_message(
                message_id,
                Box::new(move |m: &mut Message| {
                    *flag = m.add_delivered(user_id, now);
                    Ok(())
                }),
            )
            .await?;

        Ok(DeliveryReceipt {
            message,
            participants: conversation.participants,
            added,
        })
    }

    /// Read receipt for one message. Returns the message if a new receipt
    /// was added, after decrementing the reader's unread counter.
    pub async fn mark_message_read(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Message>> {
        member_conversation(self.repo.as_ref(), conversation_id, user_id).await?;
        let existing = self.get(message_id).await?;
        if existing.conversation_id != conversation_id {
            return Err(AppError::NotFound("message"));
        }

        let now = Utc::now();
        let mut added = false;
        let flag = &mut added;
        let message = self
            .repo
            .update_message(
                message_id,
                Box::new(move |m: &mut Message| {
                    *flag = m.add_read(user_id, now);
                    Ok(())
                }),
            )
            .await?;

        if !added {
            return Ok(None);
        }
        self.repo
            .update_conversation(
                conversation_id,
                Box::new(move |c: &mut Conversation| {
                    c.decrement_unread(user_id, 1);
                    Ok(())
                }),
            )
            .await?;
        Ok(Some(message))
    }

    /// Read receipts for every message the user has not read yet. The unread
    /// counter drops by the number of receipts added, so a message appended
    /// meanwhile stays counted. Returns the messages that gained a receipt.
    pub async fn mark_read(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Vec<Message>> {
        member_conversation(self.repo.as_ref(), conversation_id, user_id).await?;
        let unread = self.repo.unread_message_ids(conversation_id, user_id).await?;

        let now = Utc::now();
        let mut affected = Vec::with_capacity(unread.len());
        for message_id in unread {
            let mut added = false;
            let flag = &mut added;
            let message = self
                .repo
                .update_message(
                    message_id,
                    Box::new(move |m: &mut Message| {
                        *flag = m.add_read(user_id, now);
                        Ok(())
                    }),
                )
                .await?;
            if added {
                affected.push(message);
            }
        }

        if affected.is_empty() {
            return Ok(affected);
        }

        let read = u32::try_from(affected.len()).unwrap_or(u32::MAX);
        self.repo
            .update_conversation(
                conversation_id,
                Box::new(move |c: &mut Conversation| {
                    c.decrement_unread(user_id, read);
                    Ok(())
                }),
            )
            .await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            count = affected.len(),
            "marked messages read"
        );
        Ok(affected)
    }

    async fn participants_of(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .repo
            .get_conversation(conversation_id)
            .await?
            .map(|c| c.participants)
            .unwrap_or_default())
    }
}
