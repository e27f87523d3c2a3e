// Collaborator seams
// Decision: Narrow async traits for the two stores and the outbound channel
// so the broker never names a concrete backend or channel provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Sender-keyed conversation store (store A). One live record per cellphone,
/// overwritten on re-create, never duplicated.
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    /// Conversation id currently linked to a sender, if any
    async fn get_conversation_id(&self, cellphone: &str) -> anyhow::Result<Option<String>>;

    /// Link a sender to a conversation. Upsert semantics: an existing record
    /// for the same cellphone is replaced.
    async fn put_record(
        &self,
        cellphone: &str,
        conversation_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;

    /// Refresh only the expiry of an existing record. The conversation id is
    /// immutable once created and is never re-assigned here.
    async fn update_expiry(
        &self,
        cellphone: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;
}

/// Conversation-keyed store (store B). Expiry reads plus the best-effort
/// sender write-back; otherwise read-only from the broker's perspective.
#[async_trait]
pub trait ConversationArchive: Send + Sync {
    /// Expiry recorded for a conversation, if the row exists
    async fn get_expiry(&self, conversation_id: &str) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Attach the sender's cellphone and display alias to a conversation row
    async fn bind_sender(
        &self,
        conversation_id: &str,
        cellphone: &str,
        alias: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Whether the sender is banned from the bot
    async fn is_blacklisted(&self, cellphone: &str) -> anyhow::Result<bool>;

    /// Per-bot profile: identifiers and message texts configured upstream
    async fn load_profile(&self, client: &str, bot: &str) -> anyhow::Result<Option<BotProfile>>;
}

/// Outbound message channel. Fire-and-forget from the broker's perspective:
/// send failures are logged by callers, never retried here.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> anyhow::Result<()>;
}

/// Upstream-configured identity and copy for one bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotProfile {
    pub client: String,
    pub bot: String,
    /// Text sent when the inactivity window elapses
    pub inactivity_warning: Option<String>,
    /// Text sent when the session is ended for inactivity
    pub session_end: Option<String>,
}
