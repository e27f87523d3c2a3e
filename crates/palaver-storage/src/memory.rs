// In-memory store twins for dev mode and tests

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use palaver_core::BotProfile;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct DirectoryRecord {
    conversation_id: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory sender-keyed directory
#[derive(Default)]
pub struct InMemoryDirectory {
    records: RwLock<HashMap<String, DirectoryRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_conversation_id(&self, cellphone: &str) -> Option<String> {
        self.records
            .read()
            .await
            .get(cellphone)
            .map(|r| r.conversation_id.clone())
    }

    pub async fn put_record(
        &self,
        cellphone: &str,
        conversation_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.records.write().await.insert(
            cellphone.to_string(),
            DirectoryRecord {
                conversation_id: conversation_id.to_string(),
                expires_at,
            },
        );
    }

    pub async fn update_expiry(&self, cellphone: &str, expires_at: Option<DateTime<Utc>>) {
        if let Some(record) = self.records.write().await.get_mut(cellphone) {
            record.expires_at = expires_at;
        }
    }

    pub async fn expiry(&self, cellphone: &str) -> Option<DateTime<Utc>> {
        self.records
            .read()
            .await
            .get(cellphone)
            .and_then(|r| r.expires_at)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[derive(Debug, Clone, Default)]
struct ConversationRow {
    expires_at: Option<DateTime<Utc>>,
    cellphone: Option<String>,
    alias: Option<String>,
}

/// In-memory conversation-keyed archive
#[derive(Default)]
pub struct InMemoryArchive {
    conversations: RwLock<HashMap<String, ConversationRow>>,
    banned: RwLock<Vec<String>>,
    profiles: RwLock<HashMap<(String, String), BotProfile>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_conversation(&self, conversation_id: &str, expires_at: DateTime<Utc>) {
        self.conversations.write().await.insert(
            conversation_id.to_string(),
            ConversationRow {
                expires_at: Some(expires_at),
                ..Default::default()
            },
        );
    }

    pub async fn seed_ban(&self, cellphone: &str) {
        self.banned.write().await.push(cellphone.to_string());
    }

    pub async fn seed_profile(&self, profile: BotProfile) {
        self.profiles
            .write()
            .await
            .insert((profile.client.clone(), profile.bot.clone()), profile);
    }

    pub async fn get_expiry(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .and_then(|row| row.expires_at)
    }

    pub async fn bind_sender(&self, conversation_id: &str, cellphone: &str, alias: Option<&str>) {
        let mut conversations = self.conversations.write().await;
        let row = conversations.entry(conversation_id.to_string()).or_default();
        row.cellphone = Some(cellphone.to_string());
        row.alias = alias.map(String::from);
    }

    pub async fn is_blacklisted(&self, cellphone: &str) -> bool {
        self.banned.read().await.iter().any(|b| b == cellphone)
    }

    pub async fn load_profile(&self, client: &str, bot: &str) -> Option<BotProfile> {
        self.profiles
            .read()
            .await
            .get(&(client.to_string(), bot.to_string()))
            .cloned()
    }

    pub async fn bound_sender(&self, conversation_id: &str) -> Option<(String, Option<String>)> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .and_then(|row| row.cellphone.clone().map(|c| (c, row.alias.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_upsert_overwrites() {
        let dir = InMemoryDirectory::new();
        dir.put_record("549351", "C1", None).await;
        dir.put_record("549351", "C2", None).await;
        assert_eq!(dir.get_conversation_id("549351").await.as_deref(), Some("C2"));
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_expiry_on_missing_record_is_noop() {
        let dir = InMemoryDirectory::new();
        dir.update_expiry("nobody", Some(Utc::now())).await;
        assert!(dir.get_conversation_id("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_archive_bind_and_blacklist() {
        let archive = InMemoryArchive::new();
        archive.seed_ban("666").await;
        assert!(archive.is_blacklisted("666").await);
        assert!(!archive.is_blacklisted("555").await);

        archive.bind_sender("C1", "555", Some("Ana")).await;
        assert_eq!(
            archive.bound_sender("C1").await,
            Some(("555".to_string(), Some("Ana".to_string())))
        );
    }
}
