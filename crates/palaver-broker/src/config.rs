// Broker configuration
// Decision: One transport per process, fixed at startup via TRANSPORT_MODE.
// Configuration is read from the environment with defaulted accessors.

use std::time::Duration;

use anyhow::Result;

/// How the broker talks to the remote workflow engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// One blocking call that returns the output inline
    #[default]
    Direct,
    /// Fire-and-forget start, then poll execution status until terminal
    Poll,
    /// Single request to an HTTP gateway in front of the engine
    Gateway,
}

impl std::str::FromStr for TransportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" | "sync" | "" => Ok(TransportMode::Direct),
            "poll" | "polling" => Ok(TransportMode::Poll),
            "gateway" | "http" | "api" => Ok(TransportMode::Gateway),
            _ => anyhow::bail!("Unknown transport mode: {}. Use 'direct', 'poll' or 'gateway'", s),
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportMode::Direct => "direct",
            TransportMode::Poll => "poll",
            TransportMode::Gateway => "gateway",
        };
        f.write_str(name)
    }
}

/// Configuration for the broker process
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    pub mode: TransportMode,
    /// Remote workflow identifier/ARN (direct and poll modes)
    pub workflow_id: Option<String>,
    /// Workflow engine base URL (direct and poll modes)
    pub engine_url: Option<String>,
    /// HTTP gateway URL (gateway mode)
    pub gateway_endpoint: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub poll_max_attempts: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub inactivity_warning_secs: Option<u64>,
    pub session_end_secs: Option<u64>,
    pub client_id: Option<String>,
    pub bot_id: Option<String>,
    pub directory_database_url: Option<String>,
    pub archive_database_url: Option<String>,
    pub outbound_send_url: Option<String>,
    pub bind_addr: Option<String>,
}

impl BrokerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mode = std::env::var("TRANSPORT_MODE").unwrap_or_default().parse()?;

        Ok(Self {
            mode,
            workflow_id: std::env::var("WORKFLOW_ID").ok(),
            engine_url: std::env::var("ENGINE_URL").ok(),
            gateway_endpoint: std::env::var("GATEWAY_ENDPOINT").ok(),
            poll_interval_ms: parse_var("POLL_INTERVAL_MS"),
            poll_max_attempts: parse_var("POLL_MAX_ATTEMPTS"),
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS"),
            inactivity_warning_secs: parse_var("INACTIVITY_WARNING_SECS"),
            session_end_secs: parse_var("SESSION_END_SECS"),
            client_id: std::env::var("CLIENT_ID").ok(),
            bot_id: std::env::var("BOT_ID").ok(),
            directory_database_url: std::env::var("DIRECTORY_DATABASE_URL").ok(),
            archive_database_url: std::env::var("ARCHIVE_DATABASE_URL").ok(),
            outbound_send_url: std::env::var("OUTBOUND_SEND_URL").ok(),
            bind_addr: std::env::var("BIND_ADDR").ok(),
        })
    }

    /// Check that the selected transport has the settings it needs.
    /// Done once at startup so a misconfigured process fails before serving.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            TransportMode::Direct | TransportMode::Poll => {
                if self.engine_url.as_deref().unwrap_or("").is_empty() {
                    anyhow::bail!("ENGINE_URL is not configured");
                }
                if self.workflow_id.as_deref().unwrap_or("").is_empty() {
                    anyhow::bail!("WORKFLOW_ID is not configured");
                }
            }
            TransportMode::Gateway => {
                if self.gateway_endpoint.as_deref().unwrap_or("").is_empty() {
                    anyhow::bail!("GATEWAY_ENDPOINT is not configured");
                }
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(1_000))
    }

    pub fn poll_max_attempts(&self) -> u32 {
        self.poll_max_attempts.unwrap_or(30)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(30))
    }

    pub fn inactivity_warning_window(&self) -> Duration {
        Duration::from_secs(self.inactivity_warning_secs.unwrap_or(10 * 60))
    }

    pub fn session_end_window(&self) -> Duration {
        Duration::from_secs(self.session_end_secs.unwrap_or(15 * 60))
    }

    pub fn client_id(&self) -> String {
        self.client_id.clone().unwrap_or_default()
    }

    pub fn bot_id(&self) -> String {
        self.bot_id.clone().unwrap_or_default()
    }

    pub fn bind_addr(&self) -> String {
        self.bind_addr
            .clone()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
