// End-to-end turn flow against a mock workflow engine

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use palaver_broker::broker::{InboundMessage, TurnBroker};
use palaver_broker::config::{BrokerConfig, TransportMode};
use palaver_broker::coordinator::ExecutionCoordinator;
use palaver_broker::reconcile::StoreReconciler;
use palaver_broker::session::SessionTimers;
use palaver_broker::transport::create_transport;
use palaver_core::OutboundChannel;
use palaver_storage::{ArchiveStore, DirectoryStore, InMemoryArchive, InMemoryDirectory};
use tokio::sync::{watch, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingChannel {
    sends: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    async fn send(&self, recipient: &str, text: &str) -> anyhow::Result<()> {
        self.sends
            .lock()
            .await
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}

struct Harness {
    broker: TurnBroker,
    channel: Arc<RecordingChannel>,
    directory: Arc<InMemoryDirectory>,
    archive: Arc<InMemoryArchive>,
}

fn direct_config(engine_url: &str) -> BrokerConfig {
    BrokerConfig {
        mode: TransportMode::Direct,
        engine_url: Some(engine_url.to_string()),
        workflow_id: Some("wf-turn".to_string()),
        ..Default::default()
    }
}

fn harness(config: &BrokerConfig) -> Harness {
    let directory = Arc::new(InMemoryDirectory::new());
    let archive = Arc::new(InMemoryArchive::new());
    let channel = Arc::new(RecordingChannel::default());

    let directory_store = Arc::new(DirectoryStore::InMemory(directory.clone()));
    let archive_store = Arc::new(ArchiveStore::InMemory(archive.clone()));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let transport = create_transport(config, shutdown_rx).unwrap();

    let timers = SessionTimers::new(
        channel.clone(),
        Duration::from_secs(600),
        Duration::from_secs(900),
        None,
        None,
    );

    let broker = TurnBroker::new(
        ExecutionCoordinator::new(transport),
        StoreReconciler::new(directory_store.clone(), archive_store.clone()),
        timers,
        directory_store,
        archive_store,
        channel.clone(),
        "acme".to_string(),
        "support".to_string(),
    );

    Harness {
        broker,
        channel,
        directory,
        archive,
    }
}

fn message(body: &str) -> InboundMessage {
    InboundMessage {
        cellphone: "5511999990000".to_string(),
        body: body.to_string(),
        alias: Some("Ana".to_string()),
    }
}

fn sync_success_body(reply: &str) -> serde_json::Value {
    serde_json::json!({
        "status": "SUCCEEDED",
        "output": {
            "status": "success",
            "details": {
                "conversation_id": "c-1",
                "conversation_history": ["hi", reply],
            }
        }
    })
}

#[tokio::test]
async fn test_turn_sends_exactly_one_cleaned_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/sync"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sync_success_body("Hello Ana! <END_OF_TURN>")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&direct_config(&server.uri()));
    h.archive
        .seed_conversation("c-1", Utc::now() + ChronoDuration::hours(1))
        .await;

    h.broker.handle_message(message("hi")).await;

    let sends = h.channel.sends.lock().await.clone();
    assert_eq!(
        sends,
        vec![("5511999990000".to_string(), "Hello Ana!".to_string())]
    );
    // new conversation got a directory record and a sender binding
    assert_eq!(
        h.directory.get_conversation_id("5511999990000").await.as_deref(),
        Some("c-1")
    );
    assert_eq!(
        h.archive.bound_sender("c-1").await,
        Some(("5511999990000".to_string(), Some("Ana".to_string())))
    );
}

#[tokio::test]
async fn test_failure_result_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "FAILED",
        })))
        .mount(&server)
        .await;

    let h = harness(&direct_config(&server.uri()));
    h.broker.handle_message(message("hi")).await;

    assert!(h.channel.sends.lock().await.is_empty());
    assert!(h.directory.get_conversation_id("5511999990000").await.is_none());
}

#[tokio::test]
async fn test_corrupted_output_still_produces_reply() {
    // trailing comma and unterminated details are repaired by the normalizer
    let corrupted = r#"{"status": "success", "details": {"conversation_id": "c-9", "conversation_history": ["hi", "Recovered reply"],}}"#;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "SUCCEEDED",
            "output": corrupted,
        })))
        .mount(&server)
        .await;

    let h = harness(&direct_config(&server.uri()));
    h.broker.handle_message(message("hi")).await;

    let sends = h.channel.sends.lock().await.clone();
    assert_eq!(
        sends,
        vec![("5511999990000".to_string(), "Recovered reply".to_string())]
    );
}

#[tokio::test]
async fn test_blacklisted_sender_never_reaches_engine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_success_body("nope")))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&direct_config(&server.uri()));
    h.archive.seed_ban("5511999990000").await;

    h.broker.handle_message(message("hi")).await;

    assert!(h.channel.sends.lock().await.is_empty());
}

#[tokio::test]
async fn test_media_marker_gets_apology_without_engine_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_success_body("nope")))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&direct_config(&server.uri()));
    h.broker.handle_message(message("_event_voice_")).await;
    // a media event arriving with a caption is still a media event
    h.broker.handle_message(message("_event_media_ vacation.jpg")).await;

    let sends = h.channel.sends.lock().await.clone();
    assert_eq!(sends.len(), 2);
    assert!(sends[0].1.contains("voice"));
    assert!(sends[1].1.contains("text messages"));
}

#[tokio::test]
async fn test_sender_lock_is_released_after_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_success_body("Hi!")))
        .mount(&server)
        .await;

    let h = harness(&direct_config(&server.uri()));
    h.broker.handle_message(message("hi")).await;
    h.broker.handle_message(message("still here")).await;

    assert_eq!(h.broker.sender_lock_count().await, 0);
}

#[tokio::test]
async fn test_empty_message_is_ignored() {
    let server = MockServer::start().await;
    let h = harness(&direct_config(&server.uri()));

    h.broker.handle_message(message("   ")).await;

    assert!(h.channel.sends.lock().await.is_empty());
}

#[tokio::test]
async fn test_known_conversation_keeps_directory_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/sync"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sync_success_body("Welcome back!")),
        )
        .mount(&server)
        .await;

    let h = harness(&direct_config(&server.uri()));
    let old_expiry = Utc::now() + ChronoDuration::minutes(5);
    let new_expiry = Utc::now() + ChronoDuration::hours(2);
    h.directory.put_record("5511999990000", "c-1", Some(old_expiry)).await;
    h.archive.seed_conversation("c-1", new_expiry).await;

    h.broker.handle_message(message("hi again")).await;

    assert_eq!(
        h.directory.get_conversation_id("5511999990000").await.as_deref(),
        Some("c-1")
    );
    assert_eq!(h.directory.expiry("5511999990000").await, Some(new_expiry));
    // existing conversations are not re-bound
    assert_eq!(h.archive.bound_sender("c-1").await, None);
}
