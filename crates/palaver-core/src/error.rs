// Error types for turn brokering

use thiserror::Error;

/// Result type alias for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur while brokering a turn
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A required payload field is missing or empty; caught before any remote call
    #[error("invalid payload: missing or empty field '{0}'")]
    PayloadInvalid(String),

    /// Network/timeout/non-2xx failure talking to the workflow engine
    #[error("transport error: {message}")]
    Transport {
        message: String,
        /// Transport-level error code when one exists (HTTP status, engine error code)
        code: Option<String>,
    },

    /// The remote workflow reported a terminal failure state
    #[error("execution failed with status: {0}")]
    ExecutionFailed(String),

    /// Polling budget exhausted while the execution was still running.
    /// The remote execution is not cancelled and may still complete later.
    #[error("execution timed out after {attempts} attempts")]
    ExecutionTimedOut { attempts: u32 },

    /// Every recovery stage of the normalizer was exhausted
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A conversation store call failed during reconciliation
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BrokerError {
    /// Create a payload-validation error for a named field
    pub fn invalid_field(field: impl Into<String>) -> Self {
        BrokerError::PayloadInvalid(field.into())
    }

    /// Create a transport error without a code
    pub fn transport(msg: impl Into<String>) -> Self {
        BrokerError::Transport {
            message: msg.into(),
            code: None,
        }
    }

    /// Create a transport error tagged with a code
    pub fn transport_with_code(msg: impl Into<String>, code: impl Into<String>) -> Self {
        BrokerError::Transport {
            message: msg.into(),
            code: Some(code.into()),
        }
    }

    /// Create an execution-failed error for a terminal engine state
    pub fn execution_failed(state: impl Into<String>) -> Self {
        BrokerError::ExecutionFailed(state.into())
    }

    /// Create a malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        BrokerError::MalformedResponse(msg.into())
    }

    /// Create a store-unavailable error
    pub fn store(msg: impl Into<String>) -> Self {
        BrokerError::StoreUnavailable(msg.into())
    }

    /// Transport code when this is a transport error
    pub fn code(&self) -> Option<&str> {
        match self {
            BrokerError::Transport { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
