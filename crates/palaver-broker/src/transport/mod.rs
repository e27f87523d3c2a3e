// Workflow engine transports
// Decision: Trait-based abstraction over the three ways to reach the engine,
// selected once at startup from configuration. Implementations hold only a
// shared reqwest client, so concurrent turns never interfere.

pub mod direct;
pub mod gateway;
pub mod poll;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use palaver_core::{BrokerError, ExecutionPayload, RawOutput};
use tokio::sync::watch;

use crate::config::{BrokerConfig, TransportMode};

pub use direct::DirectTransport;
pub use gateway::GatewayTransport;
pub use poll::PollingTransport;

/// One way to invoke the remote workflow engine for a turn
#[async_trait]
pub trait WorkflowTransport: Send + Sync {
    /// Submit the payload and obtain raw output, or a typed transport error.
    /// Raw output always goes through the normalizer afterwards; transports
    /// never interpret the envelope themselves.
    async fn invoke(&self, payload: &ExecutionPayload) -> Result<RawOutput, BrokerError>;
}

/// Create the configured transport
pub fn create_transport(
    config: &BrokerConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<Arc<dyn WorkflowTransport>> {
    config.validate()?;

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;

    match config.mode {
        TransportMode::Direct => {
            tracing::info!("Using direct-synchronous workflow transport");
            Ok(Arc::new(DirectTransport::new(
                client,
                config.engine_url.clone().unwrap_or_default(),
                config.workflow_id.clone().unwrap_or_default(),
            )))
        }
        TransportMode::Poll => {
            tracing::info!(
                interval_ms = config.poll_interval().as_millis() as u64,
                max_attempts = config.poll_max_attempts(),
                "Using poll-until-done workflow transport"
            );
            Ok(Arc::new(PollingTransport::new(
                client,
                config.engine_url.clone().unwrap_or_default(),
                config.workflow_id.clone().unwrap_or_default(),
                config.poll_interval(),
                config.poll_max_attempts(),
                shutdown,
            )))
        }
        TransportMode::Gateway => {
            tracing::info!("Using HTTP gateway workflow transport");
            Ok(Arc::new(GatewayTransport::new(
                client,
                config.gateway_endpoint.clone().unwrap_or_default(),
            )))
        }
    }
}

/// Map a reqwest failure to the transport error taxonomy
pub(crate) fn request_error(err: reqwest::Error) -> BrokerError {
    let code = err
        .status()
        .map(|s| s.as_u16().to_string())
        .or_else(|| err.is_timeout().then(|| "timeout".to_string()));
    match code {
        Some(code) => BrokerError::transport_with_code(err.to_string(), code),
        None => BrokerError::transport(err.to_string()),
    }
}

/// Reject non-2xx responses, keeping the status as the error code
pub(crate) fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BrokerError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BrokerError::transport_with_code(
            format!("workflow engine returned {status}"),
            status.as_u16().to_string(),
        ))
    }
}
