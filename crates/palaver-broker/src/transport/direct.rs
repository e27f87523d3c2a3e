// Direct-synchronous transport
// Decision: One POST that blocks until the engine finishes the execution and
// returns the output inline. Simplest mode, bounded by the request timeout.

use async_trait::async_trait;
use palaver_core::{BrokerError, ExecutionPayload, RawOutput};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ensure_success, request_error, WorkflowTransport};

pub struct DirectTransport {
    client: reqwest::Client,
    engine_url: String,
    workflow_id: String,
}

#[derive(Debug, Deserialize)]
struct SyncExecutionResponse {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    execution_ref: Option<String>,
}

impl DirectTransport {
    pub fn new(client: reqwest::Client, engine_url: String, workflow_id: String) -> Self {
        Self {
            client,
            engine_url,
            workflow_id,
        }
    }
}

#[async_trait]
impl WorkflowTransport for DirectTransport {
    async fn invoke(&self, payload: &ExecutionPayload) -> Result<RawOutput, BrokerError> {
        payload.validate()?;

        let url = format!("{}/executions/sync", self.engine_url.trim_end_matches('/'));
        let body = json!({
            "workflow": self.workflow_id,
            "input": payload,
        });

        tracing::debug!(url = %url, "Submitting synchronous execution");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response)?;

        let parsed: SyncExecutionResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::malformed(format!("invalid engine response: {e}")))?;

        if parsed.status != "SUCCEEDED" {
            tracing::warn!(
                status = %parsed.status,
                execution_ref = parsed.execution_ref.as_deref().unwrap_or("-"),
                "Execution finished in a non-success state"
            );
            return Err(BrokerError::execution_failed(parsed.status));
        }

        match parsed.output {
            Some(Value::String(text)) => Ok(RawOutput::Text(text)),
            Some(value) => Ok(RawOutput::Structured(value)),
            None => Err(BrokerError::transport(
                "execution succeeded but returned no output",
            )),
        }
    }
}
