//! Read access to the user profile store owned by the identity service.

use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use deadpool_postgres::Pool;
use uuid::Uuid;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>>;

    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool>;

    async fn touch_last_active(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool,
}

impl PgUserDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT COALESCE(display_name, username) AS name FROM users WHERE id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.and_then(|r| r.get::<_, Option<String>>("name")))
    }

    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND deleted_at IS NULL)",
                &[&user_id],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn touch_last_active(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE users SET last_active_at = $2 WHERE id = $1",
                &[&user_id, &at],
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub display_name: String,
    pub last_active_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

/// In-process directory for tests and `STORAGE_BACKEND=memory`.
/// Unknown users are treated as existing so local clients can connect with
/// any valid token; only users marked deleted are missing.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<Uuid, DirectoryEntry>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: Uuid, display_name: impl Into<String>) {
        self.users.insert(
            user_id,
            DirectoryEntry {
                display_name: display_name.into(),
                last_active_at: None,
                deleted: false,
            },
        );
    }

    /// Soft-delete a user, as the identity service does
    pub fn delete(&self, user_id: Uuid) {
        if let Some(mut entry) = self.users.get_mut(&user_id) {
            entry.deleted = true;
        }
    }

    pub fn last_active(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.users.get(&user_id).and_then(|e| e.last_active_at)
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.users.get(&user_id).map(|e| e.display_name.clone()))
    }

    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(!self.users.get(&user_id).is_some_and(|e| e.deleted))
    }

    async fn touch_last_active(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        self.users
            .entry(user_id)
            .or_insert_with(|| DirectoryEntry {
                display_name: String::new(),
                last_active_at: None,
                deleted: false,
            })
            .last_active_at = Some(at);
        Ok(())
    }
}
