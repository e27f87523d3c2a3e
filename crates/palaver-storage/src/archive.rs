// Conversation-keyed archive (store B)
//
// Read-mostly from the broker's perspective: expiry lookups, blacklist
// membership and bot profiles, plus the best-effort sender write-back on
// newly created conversations.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use palaver_core::{BotProfile, ConversationArchive};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::memory::InMemoryArchive;

/// Archive backend: PostgreSQL in production, in-memory in dev mode
#[derive(Clone)]
pub enum ArchiveStore {
    Postgres(PgArchive),
    InMemory(Arc<InMemoryArchive>),
}

impl ArchiveStore {
    /// Connect to PostgreSQL and apply the archive schema
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to archive database")?;
        sqlx::migrate!("./migrations/archive")
            .run(&pool)
            .await
            .context("Failed to run archive migrations")?;
        Ok(Self::Postgres(PgArchive { pool }))
    }

    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryArchive::new()))
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
impl ConversationArchive for ArchiveStore {
    async fn get_expiry(&self, conversation_id: &str) -> Result<Option<DateTime<Utc>>> {
        match self {
            Self::Postgres(db) => db.get_expiry(conversation_id).await,
            Self::InMemory(db) => Ok(db.get_expiry(conversation_id).await),
        }
    }

    async fn bind_sender(
        &self,
        conversation_id: &str,
        cellphone: &str,
        alias: Option<&str>,
    ) -> Result<()> {
        match self {
            Self::Postgres(db) => db.bind_sender(conversation_id, cellphone, alias).await,
            Self::InMemory(db) => {
                db.bind_sender(conversation_id, cellphone, alias).await;
                Ok(())
            }
        }
    }

    async fn is_blacklisted(&self, cellphone: &str) -> Result<bool> {
        match self {
            Self::Postgres(db) => db.is_blacklisted(cellphone).await,
            Self::InMemory(db) => Ok(db.is_blacklisted(cellphone).await),
        }
    }

    async fn load_profile(&self, client: &str, bot: &str) -> Result<Option<BotProfile>> {
        match self {
            Self::Postgres(db) => db.load_profile(client, bot).await,
            Self::InMemory(db) => Ok(db.load_profile(client, bot).await),
        }
    }
}

/// PostgreSQL-backed archive
#[derive(Clone)]
pub struct PgArchive {
    pool: PgPool,
}

impl PgArchive {
    async fn get_expiry(&self, conversation_id: &str) -> Result<Option<DateTime<Utc>>> {
        let expiry = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT expires_at FROM conversations WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read conversation expiry from archive")?;
        Ok(expiry.flatten())
    }

    async fn bind_sender(
        &self,
        conversation_id: &str,
        cellphone: &str,
        alias: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET cellphone = $2, alias = $3 WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .bind(cellphone)
        .bind(alias)
        .execute(&self.pool)
        .await
        .context("Failed to bind sender to conversation")?;
        Ok(())
    }

    async fn is_blacklisted(&self, cellphone: &str) -> Result<bool> {
        let hit = sqlx::query_scalar::<_, i32>("SELECT 1 FROM banned_phones WHERE cellphone = $1")
            .bind(cellphone)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check blacklist")?;
        Ok(hit.is_some())
    }

    async fn load_profile(&self, client: &str, bot: &str) -> Result<Option<BotProfile>> {
        let row = sqlx::query(
            "SELECT client, bot, inactivity_warning, session_end \
             FROM bot_profiles WHERE client = $1 AND bot = $2",
        )
        .bind(client)
        .bind(bot)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load bot profile")?;

        Ok(row.map(|row| BotProfile {
            client: row.get("client"),
            bot: row.get("bot"),
            inactivity_warning: row.get("inactivity_warning"),
            session_end: row.get("session_end"),
        }))
    }
}
