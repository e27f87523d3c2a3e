// Canonical workflow execution result
//
// The engine speaks a `{status, message, details}` envelope. `ExecutionResult`
// serializes to and from exactly that envelope so a canonical result survives
// a serialize/normalize round trip unchanged.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Outcome of one remote workflow invocation, after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub enum ExecutionResult {
    Success(SuccessDetails),
    Failure(FailureDetails),
}

/// Successful turn: the engine assigned (or confirmed) a conversation and
/// produced at least the conversation history
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessDetails {
    pub conversation_id: String,
    pub client: Option<String>,
    pub bot: Option<String>,
    pub cellphone: Option<String>,
    /// Ordered turns, oldest first. Never null; may be empty, in which case
    /// the orchestrator has no reply to extract.
    pub history: Vec<String>,
    pub stage: Option<String>,
    pub execution_ref: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Failed turn, from the engine or synthesized locally
#[derive(Debug, Clone, PartialEq)]
pub struct FailureDetails {
    pub message: String,
    pub cause: Option<String>,
    pub execution_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// Build a local failure with the current time
    pub fn failure(message: impl Into<String>, cause: Option<String>) -> Self {
        ExecutionResult::Failure(FailureDetails {
            message: message.into(),
            cause,
            execution_ref: None,
            timestamp: Utc::now(),
        })
    }

    /// Convert a broker error into a failure result
    pub fn from_error(err: &BrokerError) -> Self {
        let cause = err.code().map(String::from);
        ExecutionResult::failure(err.to_string(), cause)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }
}

// =============================================================================
// Wire envelope
// =============================================================================

/// The engine's wire shape. Lenient on input: every detail field is optional
/// and `started_at` accepts either an RFC 3339 string or a bare epoch number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<EnvelopeDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EnvelopeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cellphone: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_conversation_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accept RFC 3339 strings or bare epoch seconds (the engine has emitted both)
fn parse_started_at(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            s.parse::<f64>().ok().and_then(epoch_to_datetime)
        }
        serde_json::Value::Number(n) => n.as_f64().and_then(epoch_to_datetime),
        _ => None,
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}

impl TryFrom<Envelope> for ExecutionResult {
    type Error = String;

    fn try_from(env: Envelope) -> Result<Self, String> {
        match env.status.as_str() {
            "success" => {
                let details = env
                    .details
                    .ok_or_else(|| "success envelope without details".to_string())?;
                let conversation_id = details
                    .conversation_id
                    .ok_or_else(|| "success envelope without conversation_id".to_string())?;
                Ok(ExecutionResult::Success(SuccessDetails {
                    conversation_id,
                    client: details.client,
                    bot: details.bot,
                    cellphone: details.cellphone,
                    history: details.conversation_history,
                    stage: details.current_conversation_stage,
                    execution_ref: details.execution_ref,
                    started_at: details.started_at.as_ref().and_then(parse_started_at),
                }))
            }
            "error" => {
                let details = env.details.unwrap_or_default();
                let message = env
                    .message
                    .or_else(|| details.error.clone())
                    .unwrap_or_else(|| "workflow execution failed".to_string());
                Ok(ExecutionResult::Failure(FailureDetails {
                    message,
                    cause: details.error,
                    execution_ref: details.execution_ref,
                    timestamp: details.timestamp.unwrap_or_else(Utc::now),
                }))
            }
            other => Err(format!("unrecognized envelope status '{other}'")),
        }
    }
}

impl From<ExecutionResult> for Envelope {
    fn from(result: ExecutionResult) -> Self {
        match result {
            ExecutionResult::Success(s) => Envelope {
                status: "success".to_string(),
                message: Some("workflow executed successfully".to_string()),
                details: Some(EnvelopeDetails {
                    conversation_id: Some(s.conversation_id),
                    client: s.client,
                    bot: s.bot,
                    cellphone: s.cellphone,
                    conversation_history: s.history,
                    current_conversation_stage: s.stage,
                    execution_ref: s.execution_ref,
                    started_at: s.started_at.map(|dt| {
                        serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::Micros, true))
                    }),
                    error: None,
                    timestamp: None,
                }),
            },
            ExecutionResult::Failure(f) => Envelope {
                status: "error".to_string(),
                message: Some(f.message),
                details: Some(EnvelopeDetails {
                    // History stays present-and-empty on error envelopes so
                    // downstream consumers never see a null
                    conversation_history: Vec::new(),
                    error: f.cause,
                    execution_ref: f.execution_ref,
                    timestamp: Some(f.timestamp),
                    ..Default::default()
                }),
            },
        }
    }
}
