use super::{AppendOutcome, AppendStep, ChatRepository, InsertOutcome, Mutation};
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use uuid::Uuid;

/// Conversations and messages stored as JSONB documents, with the fields
/// used for lookups and ordering mirrored into indexed columns.
#[derive(Clone)]
pub struct PgChatRepository {
    pool: Pool,
}

impl PgChatRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn conversation_from_row(row: &Row) -> Conversation {
    let Json(conversation) = row.get::<_, Json<Conversation>>("doc");
    conversation
}

fn message_from_row(row: &Row) -> Message {
    let Json(message) = row.get::<_, Json<Message>>("doc");
    message
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<InsertOutcome> {
        let client = self.pool.get().await?;
        let direct_key = conversation.direct_key();

        let inserted = client
            .execute(
                r#"
                INSERT INTO chat_conversations
                    (id, kind, direct_key, participants, last_activity_at, active, doc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &conversation.id,
                    &conversation.kind.as_str(),
                    &direct_key,
                    &conversation.participants,
                    &conversation.last_activity_at,
                    &conversation.active,
                    &Json(conversation),
                ],
            )
            .await;

        match inserted {
            Ok(_) => Ok(InsertOutcome::Inserted(conversation.clone())),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                let key = direct_key.ok_or_else(|| AppError::Conflict(e.to_string()))?;
                tracing::debug!(direct_key = %key, "direct conversation insert lost race");
                let existing = self
                    .find_direct(&key)
                    .await?
                    .ok_or_else(|| AppError::Conflict("direct conversation vanished".into()))?;
                Ok(InsertOutcome::DirectExists(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT doc FROM chat_conversations WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn find_direct(&self, key: &str) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT doc FROM chat_conversations WHERE direct_key = $1",
                &[&key],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT doc FROM chat_conversations
                WHERE $1 = ANY(participants) AND active
                ORDER BY last_activity_at DESC
                "#,
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        mutate: Mutation<'_, Conversation>,
    ) -> AppResult<Conversation> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                "SELECT doc FROM chat_conversations WHERE id = $1 FOR UPDATE",
                &[&id],
            )
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        let mut conversation = conversation_from_row(&row);
        mutate(&mut conversation)?;

        tx.execute(
            r#"
            UPDATE chat_conversations
            SET participants = $2, last_activity_at = $3, active = $4, doc = $5
            WHERE id = $1
            "#,
            &[
                &id,
                &conversation.participants,
                &conversation.last_activity_at,
                &conversation.active,
                &Json(&conversation),
            ],
        )
        .await?;
        tx.commit().await?;

        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        step: AppendStep<'_>,
    ) -> AppResult<AppendOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                "SELECT doc FROM chat_conversations WHERE id = $1 FOR UPDATE",
                &[&conversation_id],
            )
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        let current = conversation_from_row(&row);
        let mut conversation = current.clone();
        let message = step(&mut conversation)?;

        let inserted = tx
            .query_opt(
                r#"
                INSERT INTO chat_messages
                    (id, conversation_id, sender_id, kind, client_message_id, created_at, doc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (conversation_id, sender_id, client_message_id)
                    WHERE client_message_id IS NOT NULL
                    DO NOTHING
                RETURNING id
                "#,
                &[
                    &message.id,
                    &message.conversation_id,
                    &message.sender_id,
                    &message.kind.as_str(),
                    &message.client_message_id,
                    &message.created_at,
                    &Json(&message),
                ],
            )
            .await?;

        if inserted.is_none() {
            let existing = tx
                .query_one(
                    r#"
                    SELECT doc FROM chat_messages
                    WHERE conversation_id = $1 AND sender_id = $2 AND client_message_id = $3
                    "#,
                    &[&conversation_id, &message.sender_id, &message.client_message_id],
                )
                .await?;
            tx.rollback().await?;
            return Ok(AppendOutcome::Duplicate {
                message: message_from_row(&existing),
                conversation: current,
            });
        }

        tx.execute(
            r#"
            UPDATE chat_conversations
            SET participants = $2, last_activity_at = $3, active = $4, doc = $5
            WHERE id = $1
            "#,
            &[
                &conversation_id,
                &conversation.participants,
                &conversation.last_activity_at,
                &conversation.active,
                &Json(&conversation),
            ],
        )
        .await?;
        tx.commit().await?;

        Ok(AppendOutcome::Inserted {
            message,
            conversation,
        })
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT doc FROM chat_messages WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn update_message(&self, id: Uuid, mutate: Mutation<'_, Message>) -> AppResult<Message> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt("SELECT doc FROM chat_messages WHERE id = $1 FOR UPDATE", &[&id])
            .await?
            .ok_or(AppError::NotFound("message"))?;
        let mut message = message_from_row(&row);
        mutate(&mut message)?;

        tx.execute(
            "UPDATE chat_messages SET doc = $2 WHERE id = $1",
            &[&id, &Json(&message)],
        )
        .await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        offset: usize,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT doc FROM chat_messages
                WHERE conversation_id = $1
                  AND NOT jsonb_exists(doc->'deleted_for', $2)
                ORDER BY created_at DESC, id DESC
                OFFSET $3 LIMIT $4
                "#,
                &[
                    &conversation_id,
                    &viewer.to_string(),
                    &(offset as i64),
                    &(limit as i64),
                ],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn unread_message_ids(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id FROM chat_messages m
                WHERE m.conversation_id = $1
                  AND m.sender_id <> $2
                  AND NOT EXISTS (
                      SELECT 1 FROM jsonb_array_elements(m.doc->'read_by') r
                      WHERE r->>'userId' = $3
                  )
                ORDER BY m.created_at DESC
                "#,
                &[&conversation_id, &user_id, &user_id.to_string()],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, Uuid>("id")).collect())
    }

    async fn text_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT doc FROM chat_messages
                WHERE conversation_id = $1 AND kind = 'text'
                ORDER BY created_at DESC, id DESC
                "#,
                &[&conversation_id],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }
}
