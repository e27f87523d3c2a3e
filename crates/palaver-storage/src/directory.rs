// Sender-keyed conversation directory (store A)
// Decision: Enum dispatch over Postgres/in-memory rather than trait objects,
// matching the archive store

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use palaver_core::ConversationDirectory;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::memory::InMemoryDirectory;

/// Directory backend: PostgreSQL in production, in-memory in dev mode
#[derive(Clone)]
pub enum DirectoryStore {
    Postgres(PgDirectory),
    InMemory(Arc<InMemoryDirectory>),
}

impl DirectoryStore {
    /// Connect to PostgreSQL and apply the directory schema
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to directory database")?;
        sqlx::migrate!("./migrations/directory")
            .run(&pool)
            .await
            .context("Failed to run directory migrations")?;
        Ok(Self::Postgres(PgDirectory { pool }))
    }

    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryDirectory::new()))
    }

    /// Cheap connectivity probe, logged by the caller at startup
    pub async fn check_connection(&self) -> bool {
        match self {
            Self::Postgres(db) => sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(&db.pool)
                .await
                .is_ok(),
            Self::InMemory(_) => true,
        }
    }
}

#[async_trait]
impl ConversationDirectory for DirectoryStore {
    async fn get_conversation_id(&self, cellphone: &str) -> Result<Option<String>> {
        match self {
            Self::Postgres(db) => db.get_conversation_id(cellphone).await,
            Self::InMemory(db) => Ok(db.get_conversation_id(cellphone).await),
        }
    }

    async fn put_record(
        &self,
        cellphone: &str,
        conversation_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match self {
            Self::Postgres(db) => db.put_record(cellphone, conversation_id, expires_at).await,
            Self::InMemory(db) => {
                db.put_record(cellphone, conversation_id, expires_at).await;
                Ok(())
            }
        }
    }

    async fn update_expiry(
        &self,
        cellphone: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match self {
            Self::Postgres(db) => db.update_expiry(cellphone, expires_at).await,
            Self::InMemory(db) => {
                db.update_expiry(cellphone, expires_at).await;
                Ok(())
            }
        }
    }
}

/// PostgreSQL-backed directory
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    async fn get_conversation_id(&self, cellphone: &str) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT conversation_id FROM conversation_directory WHERE cellphone = $1",
        )
        .bind(cellphone)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read conversation id from directory")?;
        Ok(id)
    }

    async fn put_record(
        &self,
        cellphone: &str,
        conversation_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // One live record per cellphone: re-creating replaces the old row
        sqlx::query(
            "INSERT INTO conversation_directory (cellphone, conversation_id, expires_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (cellphone) \
             DO UPDATE SET conversation_id = $2, expires_at = $3",
        )
        .bind(cellphone)
        .bind(conversation_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to store directory record")?;
        info!(cellphone = %cellphone, conversation_id = %conversation_id, "Directory record stored");
        Ok(())
    }

    async fn update_expiry(
        &self,
        cellphone: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE conversation_directory SET expires_at = $2 WHERE cellphone = $1")
            .bind(cellphone)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .context("Failed to update directory expiry")?;
        Ok(())
    }
}
