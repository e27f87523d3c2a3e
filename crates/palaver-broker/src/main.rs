// Turn broker entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use palaver_broker::broker::TurnBroker;
use palaver_broker::channel::{HttpOutboundChannel, LoggingChannel};
use palaver_broker::config::BrokerConfig;
use palaver_broker::coordinator::ExecutionCoordinator;
use palaver_broker::reconcile::StoreReconciler;
use palaver_broker::server::create_router;
use palaver_broker::session::SessionTimers;
use palaver_broker::transport::create_transport;
use palaver_core::{ConversationArchive, OutboundChannel};
use palaver_storage::{ArchiveStore, DirectoryStore};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BrokerConfig::from_env()?;
    config.validate()?;
    info!(mode = %config.mode, "Starting turn broker");

    let directory = match config.directory_database_url.as_deref() {
        Some(url) if !url.is_empty() => DirectoryStore::postgres(url).await?,
        _ => {
            info!("DIRECTORY_DATABASE_URL not set, using in-memory directory (dev mode)");
            DirectoryStore::in_memory()
        }
    };
    let archive = match config.archive_database_url.as_deref() {
        Some(url) if !url.is_empty() => ArchiveStore::postgres(url).await?,
        _ => {
            info!("ARCHIVE_DATABASE_URL not set, using in-memory archive (dev mode)");
            ArchiveStore::in_memory()
        }
    };
    info!(
        directory_ok = directory.check_connection().await,
        archive_ok = archive.check_connection().await,
        "Store connectivity probed"
    );

    let profile = archive
        .load_profile(&config.client_id(), &config.bot_id())
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, "Bot profile lookup failed, using defaults");
            None
        });
    if profile.is_none() {
        info!(
            client = %config.client_id(),
            bot = %config.bot_id(),
            "No bot profile found, using default session texts"
        );
    }

    let channel: Arc<dyn OutboundChannel> = match config.outbound_send_url.as_deref() {
        Some(url) if !url.is_empty() => {
            let client = reqwest::Client::builder()
                .timeout(config.request_timeout())
                .build()?;
            Arc::new(HttpOutboundChannel::new(client, url.to_string()))
        }
        _ => {
            info!("OUTBOUND_SEND_URL not set, replies will be logged only");
            Arc::new(LoggingChannel)
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let transport = create_transport(&config, shutdown_rx)?;

    let timers = SessionTimers::new(
        channel.clone(),
        config.inactivity_warning_window(),
        config.session_end_window(),
        profile.as_ref().and_then(|p| p.inactivity_warning.clone()),
        profile.as_ref().and_then(|p| p.session_end.clone()),
    );

    let directory = Arc::new(directory);
    let archive = Arc::new(archive);
    let broker = Arc::new(TurnBroker::new(
        ExecutionCoordinator::new(transport),
        StoreReconciler::new(directory.clone(), archive.clone()),
        timers.clone(),
        directory,
        archive,
        channel,
        config.client_id(),
        config.bot_id(),
    ));

    let app = create_router(broker);
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "Listening for inbound messages");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    timers.shutdown().await;
    info!("Turn broker stopped");
    Ok(())
}
