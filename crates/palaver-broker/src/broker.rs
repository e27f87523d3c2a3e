// Turn orchestrator
// Decision: One entry point per inbound message. Turns from the same sender
// are serialized through a per-sender mutex so concurrent deliveries cannot
// interleave store writes; different senders proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use palaver_core::{
    ConversationArchive, ConversationDirectory, ExecutionPayload, ExecutionResult, OutboundChannel,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::coordinator::ExecutionCoordinator;
use crate::reconcile::StoreReconciler;
use crate::session::SessionTimers;

/// Turn delimiter the engine appends to replies
const END_OF_TURN: &str = "<END_OF_TURN>";

/// Non-text event markers the messaging layer substitutes for media, each
/// answered with its own apology instead of reaching the engine
const MEDIA_APOLOGIES: &[(&str, &str)] = &[
    ("_event_media_", "Sorry, I can only read text messages. Could you type that out?"),
    ("_event_voice_", "Sorry, I cannot listen to voice notes yet. Could you type that out?"),
    ("_event_document_", "Sorry, I cannot open documents. Could you type out what you need?"),
];

/// One inbound message from the messaging layer
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub cellphone: String,
    pub body: String,
    /// Sender's display name, when the provider shares it
    pub alias: Option<String>,
}

pub struct TurnBroker {
    coordinator: ExecutionCoordinator,
    reconciler: StoreReconciler,
    timers: SessionTimers,
    directory: Arc<dyn ConversationDirectory>,
    archive: Arc<dyn ConversationArchive>,
    channel: Arc<dyn OutboundChannel>,
    client_id: String,
    bot_id: String,
    sender_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnBroker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: ExecutionCoordinator,
        reconciler: StoreReconciler,
        timers: SessionTimers,
        directory: Arc<dyn ConversationDirectory>,
        archive: Arc<dyn ConversationArchive>,
        channel: Arc<dyn OutboundChannel>,
        client_id: String,
        bot_id: String,
    ) -> Self {
        Self {
            coordinator,
            reconciler,
            timers,
            directory,
            archive,
            channel,
            client_id,
            bot_id,
            sender_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Handle one inbound message end to end. Never returns an error: every
    /// failure path is logged and leaves the sender without a reply rather
    /// than crashing the turn loop.
    pub async fn handle_message(&self, message: InboundMessage) {
        let lock = self.sender_lock(&message.cellphone).await;
        {
            let _guard = lock.lock().await;
            self.process_turn(&message).await;
        }
        drop(lock);
        self.release_sender_lock(&message.cellphone).await;
    }

    async fn process_turn(&self, message: &InboundMessage) {
        self.timers.reset(&message.cellphone).await;

        let body = message.body.trim();
        if body.is_empty() {
            debug!(cellphone = %message.cellphone, "Ignoring empty message");
            return;
        }

        if let Some(apology) = media_apology(body) {
            info!(cellphone = %message.cellphone, "Non-text event, sending apology");
            self.deliver(&message.cellphone, apology).await;
            return;
        }

        if self.is_banned(&message.cellphone).await {
            info!(cellphone = %message.cellphone, "Sender is blacklisted, dropping turn");
            return;
        }

        let conversation_id = match self.directory.get_conversation_id(&message.cellphone).await {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    cellphone = %message.cellphone,
                    error = %err,
                    "Directory lookup failed, starting without conversation id"
                );
                None
            }
        };

        let payload = ExecutionPayload {
            human_input: body.to_string(),
            client: self.client_id.clone(),
            bot: self.bot_id.clone(),
            cellphone: message.cellphone.clone(),
            conversation_id,
        };

        let details = match self.coordinator.execute(&payload).await {
            ExecutionResult::Success(details) => details,
            ExecutionResult::Failure(details) => {
                warn!(
                    cellphone = %message.cellphone,
                    message = %details.message,
                    cause = details.cause.as_deref().unwrap_or("-"),
                    "Turn failed, no reply sent"
                );
                return;
            }
        };

        let reply = match details.history.last() {
            Some(turn) => clean_reply(turn),
            None => {
                warn!(
                    cellphone = %message.cellphone,
                    conversation_id = %details.conversation_id,
                    "Execution succeeded with empty history, no reply to send"
                );
                return;
            }
        };
        if reply.is_empty() {
            warn!(cellphone = %message.cellphone, "Reply empty after cleaning, nothing to send");
            return;
        }

        self.reconciler
            .reconcile(&message.cellphone, message.alias.as_deref(), &details)
            .await;

        self.deliver(&message.cellphone, &reply).await;
    }

    /// Blacklist gate. Fails open: an unreadable blacklist never blocks a
    /// legitimate sender.
    async fn is_banned(&self, cellphone: &str) -> bool {
        match self.archive.is_blacklisted(cellphone).await {
            Ok(banned) => banned,
            Err(err) => {
                warn!(cellphone = %cellphone, error = %err, "Blacklist check failed, allowing sender");
                false
            }
        }
    }

    async fn deliver(&self, cellphone: &str, text: &str) {
        if let Err(err) = self.channel.send(cellphone, text).await {
            warn!(cellphone = %cellphone, error = %err, "Reply delivery failed");
        }
    }

    async fn sender_lock(&self, cellphone: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.sender_locks.read().await;
            if let Some(lock) = locks.get(cellphone) {
                return lock.clone();
            }
        }
        let mut locks = self.sender_locks.write().await;
        locks
            .entry(cellphone.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the sender's lock entry once no turn holds or awaits it, so the
    /// map does not grow one entry per sender for the process lifetime.
    /// Cloning a lock requires the map's read lock, so under the write lock
    /// a strong count of one means the map holds the only reference.
    async fn release_sender_lock(&self, cellphone: &str) {
        let mut locks = self.sender_locks.write().await;
        if let Some(lock) = locks.get(cellphone) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(cellphone);
            }
        }
    }

    /// Number of sender locks currently tracked
    pub async fn sender_lock_count(&self) -> usize {
        self.sender_locks.read().await.len()
    }
}

/// Strip turn delimiters and surrounding whitespace from the engine's reply
fn clean_reply(turn: &str) -> String {
    turn.replace(END_OF_TURN, "").trim().to_string()
}

// Prefix match: the messaging layer may append a caption or filename after
// the marker, and those still describe a non-text event
fn media_apology(body: &str) -> Option<&'static str> {
    MEDIA_APOLOGIES
        .iter()
        .find(|(marker, _)| body.starts_with(marker))
        .map(|(_, apology)| *apology)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_reply_strips_delimiter() {
        assert_eq!(clean_reply("Hello there! <END_OF_TURN>"), "Hello there!");
        assert_eq!(clean_reply("  plain  "), "plain");
        assert_eq!(clean_reply("<END_OF_TURN>"), "");
    }

    #[test]
    fn test_media_markers_have_distinct_apologies() {
        let media = media_apology("_event_media_").unwrap();
        let voice = media_apology("_event_voice_").unwrap();
        let document = media_apology("_event_document_").unwrap();
        assert_ne!(media, voice);
        assert_ne!(voice, document);
        assert!(media_apology("hello").is_none());
    }

    #[test]
    fn test_media_marker_with_caption_still_matches() {
        // captions and filenames ride along after the marker
        assert!(media_apology("_event_media_ vacation.jpg").is_some());
        assert!(media_apology("_event_document_ invoice.pdf").is_some());
        // a marker quoted mid-sentence is ordinary text
        assert!(media_apology("I wrote _event_media_ by hand").is_none());
    }
}
