use super::{AppendOutcome, AppendStep, ChatRepository, InsertOutcome, Mutation};
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, MessageKind};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    conversations: HashMap<Uuid, Conversation>,
    direct_index: HashMap<String, Uuid>,
    messages: HashMap<Uuid, Message>,
    by_conversation: HashMap<Uuid, Vec<Uuid>>,
}

impl Tables {
    /// Messages of a conversation, newest first
    fn messages_of(&self, conversation_id: Uuid) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self
            .by_conversation
            .get(&conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.messages.get(id))
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        messages
    }

    fn by_client_id(&self, message: &Message) -> Option<&Message> {
        let client_id = message.client_message_id.as_deref()?;
        self.by_conversation
            .get(&message.conversation_id)?
            .iter()
            .filter_map(|id| self.messages.get(id))
            .find(|m| {
                m.sender_id == message.sender_id && m.client_message_id.as_deref() == Some(client_id)
            })
    }
}

/// Process-local repository for tests and single-node development.
#[derive(Default)]
pub struct MemoryChatRepository {
    tables: RwLock<Tables>,
}

impl MemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for MemoryChatRepository {
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<InsertOutcome> {
        let mut tables = self.tables.write().await;

        if let Some(key) = conversation.direct_key() {
            if let Some(existing) = tables
                .direct_index
                .get(&key)
                .and_then(|id| tables.conversations.get(id))
            {
                return Ok(InsertOutcome::DirectExists(existing.clone()));
            }
            tables.direct_index.insert(key, conversation.id);
        }

        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(InsertOutcome::Inserted(conversation.clone()))
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.tables.read().await.conversations.get(&id).cloned())
    }

    async fn find_direct(&self, key: &str) -> AppResult<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .direct_index
            .get(key)
            .and_then(|id| tables.conversations.get(id))
            .cloned())
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut list: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.active && c.is_participant(user_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(list)
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        mutate: Mutation<'_, Conversation>,
    ) -> AppResult<Conversation> {
        let mut tables = self.tables.write().await;
        let current = tables
            .conversations
            .get_mut(&id)
            .ok_or(AppError::NotFound("conversation"))?;

        // Mutate a copy so a failed closure leaves the document untouched
        let mut next = current.clone();
        mutate(&mut next)?;
        *current = next.clone();
        Ok(next)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        step: AppendStep<'_>,
    ) -> AppResult<AppendOutcome> {
        let mut tables = self.tables.write().await;
        let current = tables
            .conversations
            .get(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;

        let mut next = current.clone();
        let message = step(&mut next)?;

        if let Some(existing) = tables.by_client_id(&message) {
            return Ok(AppendOutcome::Duplicate {
                message: existing.clone(),
                conversation: current.clone(),
            });
        }

        tables.messages.insert(message.id, message.clone());
        tables
            .by_conversation
            .entry(conversation_id)
            .or_default()
            .push(message.id);
        tables.conversations.insert(conversation_id, next.clone());
        Ok(AppendOutcome::Inserted {
            message,
            conversation: next,
        })
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn update_message(&self, id: Uuid, mutate: Mutation<'_, Message>) -> AppResult<Message> {
        let mut tables = self.tables.write().await;
        let current = tables
            .messages
            .get_mut(&id)
            .ok_or(AppError::NotFound("message"))?;

        let mut next = current.clone();
        mutate(&mut next)?;
        *current = next.clone();
        Ok(next)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        offset: usize,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages_of(conversation_id)
            .into_iter()
            .filter(|m| !m.is_hidden_for(viewer))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn unread_message_ids(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages_of(conversation_id)
            .into_iter()
            .filter(|m| m.sender_id != user_id && !m.is_read_by(user_id))
            .map(|m| m.id)
            .collect())
    }

    async fn text_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages_of(conversation_id)
            .into_iter()
            .filter(|m| m.kind == MessageKind::Text)
            .cloned()
            .collect())
    }
}
