// Store reconciliation
// Decision: Reconciliation runs after the reply is known and never blocks it.
// Every store failure is logged and swallowed so the sender still gets a
// response when a backend is degraded.

use std::sync::Arc;

use palaver_core::{ConversationArchive, ConversationDirectory, SuccessDetails};
use tracing::{debug, warn};

pub struct StoreReconciler {
    directory: Arc<dyn ConversationDirectory>,
    archive: Arc<dyn ConversationArchive>,
}

impl StoreReconciler {
    pub fn new(
        directory: Arc<dyn ConversationDirectory>,
        archive: Arc<dyn ConversationArchive>,
    ) -> Self {
        Self { directory, archive }
    }

    /// Bring the sender-keyed directory in line with the archive after a
    /// successful turn. New conversations get a directory record and a
    /// sender binding on the archive row; known conversations only have
    /// their expiry refreshed.
    pub async fn reconcile(
        &self,
        cellphone: &str,
        alias: Option<&str>,
        details: &SuccessDetails,
    ) {
        let conversation_id = details.conversation_id.as_str();

        let expires_at = match self.archive.get_expiry(conversation_id).await {
            Ok(expiry) => expiry,
            Err(err) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "Archive expiry lookup failed, skipping reconciliation"
                );
                return;
            }
        };

        // Existence decides the branch: a directory record's conversation id
        // is immutable once created and is never re-assigned.
        let known = match self.directory.get_conversation_id(cellphone).await {
            Ok(existing) => existing.is_some(),
            Err(err) => {
                warn!(cellphone = %cellphone, error = %err, "Directory lookup failed");
                false
            }
        };

        if known {
            debug!(conversation_id = %conversation_id, "Refreshing directory expiry");
            if let Err(err) = self.directory.update_expiry(cellphone, expires_at).await {
                warn!(cellphone = %cellphone, error = %err, "Directory expiry refresh failed");
            }
            return;
        }

        debug!(conversation_id = %conversation_id, "Linking sender to new conversation");
        if let Err(err) = self
            .directory
            .put_record(cellphone, conversation_id, expires_at)
            .await
        {
            warn!(cellphone = %cellphone, error = %err, "Directory record write failed");
        }

        if let Err(err) = self
            .archive
            .bind_sender(conversation_id, cellphone, alias)
            .await
        {
            warn!(
                conversation_id = %conversation_id,
                error = %err,
                "Sender bind on archive row failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use palaver_core::BotProfile;
    use palaver_storage::{ArchiveStore, DirectoryStore, InMemoryArchive, InMemoryDirectory};

    use super::*;

    fn success(conversation_id: &str) -> SuccessDetails {
        SuccessDetails {
            conversation_id: conversation_id.to_string(),
            client: None,
            bot: None,
            cellphone: None,
            history: vec!["hi".to_string(), "hello!".to_string()],
            stage: None,
            execution_ref: None,
            started_at: None,
        }
    }

    #[tokio::test]
    async fn test_new_conversation_creates_record_and_binds_sender() {
        let directory = Arc::new(InMemoryDirectory::new());
        let archive = Arc::new(InMemoryArchive::new());
        let expiry = Utc::now() + Duration::hours(1);
        archive.seed_conversation("c-1", expiry).await;

        let reconciler = StoreReconciler::new(
            Arc::new(DirectoryStore::InMemory(directory.clone())),
            Arc::new(ArchiveStore::InMemory(archive.clone())),
        );
        reconciler
            .reconcile("5511999990000", Some("Ana"), &success("c-1"))
            .await;

        assert_eq!(
            directory.get_conversation_id("5511999990000").await.as_deref(),
            Some("c-1")
        );
        assert_eq!(
            archive.bound_sender("c-1").await,
            Some(("5511999990000".to_string(), Some("Ana".to_string())))
        );
    }

    #[tokio::test]
    async fn test_known_conversation_only_refreshes_expiry() {
        let directory = Arc::new(InMemoryDirectory::new());
        let archive = Arc::new(InMemoryArchive::new());

        let old_expiry = Utc::now() + Duration::minutes(5);
        let new_expiry = Utc::now() + Duration::hours(2);
        directory
            .put_record("5511999990000", "c-1", Some(old_expiry))
            .await;
        archive.seed_conversation("c-1", new_expiry).await;

        let reconciler = StoreReconciler::new(
            Arc::new(DirectoryStore::InMemory(directory.clone())),
            Arc::new(ArchiveStore::InMemory(archive.clone())),
        );
        reconciler
            .reconcile("5511999990000", None, &success("c-1"))
            .await;

        assert_eq!(directory.expiry("5511999990000").await, Some(new_expiry));
        // no re-bind for a conversation the directory already knows
        assert_eq!(archive.bound_sender("c-1").await, None);
    }

    #[tokio::test]
    async fn test_archive_failure_leaves_directory_untouched() {
        struct BrokenArchive;

        #[async_trait]
        impl ConversationArchive for BrokenArchive {
            async fn get_expiry(
                &self,
                _conversation_id: &str,
            ) -> anyhow::Result<Option<chrono::DateTime<Utc>>> {
                anyhow::bail!("archive down")
            }

            async fn bind_sender(
                &self,
                _conversation_id: &str,
                _cellphone: &str,
                _alias: Option<&str>,
            ) -> anyhow::Result<()> {
                anyhow::bail!("archive down")
            }

            async fn is_blacklisted(&self, _cellphone: &str) -> anyhow::Result<bool> {
                anyhow::bail!("archive down")
            }

            async fn load_profile(
                &self,
                _client: &str,
                _bot: &str,
            ) -> anyhow::Result<Option<BotProfile>> {
                anyhow::bail!("archive down")
            }
        }

        let directory = Arc::new(InMemoryDirectory::new());
        let reconciler = StoreReconciler::new(
            Arc::new(DirectoryStore::InMemory(directory.clone())),
            Arc::new(BrokenArchive),
        );
        reconciler
            .reconcile("5511999990000", None, &success("c-1"))
            .await;

        assert!(directory.get_conversation_id("5511999990000").await.is_none());
    }
}
