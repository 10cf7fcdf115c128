//! Document persistence for conversations and messages.
//!
//! Every method is atomic for the single document it touches. `update_*`
//! methods run the mutation closure while holding that document's lock (a
//! row lock for Postgres), so a mutation sees the latest state and nothing
//! else can interleave. Closures must not block.

mod memory;
mod postgres;

pub use memory::MemoryChatRepository;
pub use postgres::PgChatRepository;

use crate::error::AppResult;
use crate::models::{Conversation, Message};
use async_trait::async_trait;
use uuid::Uuid;

/// Read-modify-write step applied under the document lock
pub type Mutation<'a, T> = Box<dyn FnOnce(&mut T) -> AppResult<()> + Send + 'a>;

/// Builds the message to append from the locked conversation, updating the
/// conversation's pointers and counters along the way
pub type AppendStep<'a> = Box<dyn FnOnce(&mut Conversation) -> AppResult<Message> + Send + 'a>;

/// Outcome of appending a message
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    Inserted {
        message: Message,
        conversation: Conversation,
    },
    /// The sender already stored a message with the same client id. Nothing
    /// was written; the conversation is returned unchanged.
    Duplicate {
        message: Message,
        conversation: Conversation,
    },
}

/// Outcome of inserting a conversation
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Conversation),
    /// A direct conversation for the same pair already exists
    DirectExists(Conversation),
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<InsertOutcome>;

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// Direct conversation for the pair key, active or not
    async fn find_direct(&self, key: &str) -> AppResult<Option<Conversation>>;

    /// Active conversations containing the user, most recent activity first
    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    /// Apply `mutate` atomically. `NotFound` if the conversation is absent.
    async fn update_conversation(
        &self,
        id: Uuid,
        mutate: Mutation<'_, Conversation>,
    ) -> AppResult<Conversation>;

    /// Lock the conversation, run `step` on it and store the message it
    /// returns, all in one atomic unit. A message whose client id the sender
    /// already used is not stored and leaves the conversation untouched.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        step: AppendStep<'_>,
    ) -> AppResult<AppendOutcome>;

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Apply `mutate` atomically. `NotFound` if the message is absent.
    async fn update_message(&self, id: Uuid, mutate: Mutation<'_, Message>) -> AppResult<Message>;

    /// Page of messages visible to `viewer` (not deleted-for-me), newest first
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        offset: usize,
        limit: usize,
    ) -> AppResult<Vec<Message>>;

    /// Ids of messages not sent by `user_id` and not yet read by them
    async fn unread_message_ids(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Every text message in the conversation, newest first
    async fn text_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;
}
