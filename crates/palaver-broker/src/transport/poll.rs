// Poll-until-done transport
// Decision: Start the execution, then check status on a fixed interval up to
// a bounded number of attempts. Sleeps race against the shutdown signal so a
// stopping process never waits out a full poll budget.
//
// TODO: when the engine grows an abort endpoint, cancel the remote execution
// on budget exhaustion instead of leaving it running.

use std::time::Duration;

use async_trait::async_trait;
use palaver_core::{BrokerError, ExecutionPayload, RawOutput};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

use super::{ensure_success, request_error, WorkflowTransport};

pub struct PollingTransport {
    client: reqwest::Client,
    engine_url: String,
    workflow_id: String,
    interval: Duration,
    max_attempts: u32,
    shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Deserialize)]
struct StartExecutionResponse {
    execution_ref: String,
}

#[derive(Debug, Deserialize)]
struct ExecutionStatusResponse {
    status: String,
}

impl PollingTransport {
    pub fn new(
        client: reqwest::Client,
        engine_url: String,
        workflow_id: String,
        interval: Duration,
        max_attempts: u32,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            engine_url,
            workflow_id,
            interval,
            max_attempts,
            shutdown,
        }
    }

    fn base(&self) -> &str {
        self.engine_url.trim_end_matches('/')
    }

    async fn start_execution(&self, payload: &ExecutionPayload) -> Result<String, BrokerError> {
        let url = format!("{}/executions", self.base());
        let body = json!({
            "workflow": self.workflow_id,
            "input": payload,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response)?;

        let parsed: StartExecutionResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::malformed(format!("invalid start response: {e}")))?;
        Ok(parsed.execution_ref)
    }

    async fn check_status(&self, execution_ref: &str) -> Result<String, BrokerError> {
        let url = format!("{}/executions/{}", self.base(), execution_ref);
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let response = ensure_success(response)?;

        let parsed: ExecutionStatusResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::malformed(format!("invalid status response: {e}")))?;
        Ok(parsed.status)
    }

    async fn fetch_output(&self, execution_ref: &str) -> Result<RawOutput, BrokerError> {
        let url = format!("{}/executions/{}/output", self.base(), execution_ref);
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let response = ensure_success(response)?;

        let text = response.text().await.map_err(request_error)?;
        Ok(RawOutput::Text(text))
    }
}

#[async_trait]
impl WorkflowTransport for PollingTransport {
    async fn invoke(&self, payload: &ExecutionPayload) -> Result<RawOutput, BrokerError> {
        payload.validate()?;

        let execution_ref = self.start_execution(payload).await?;
        tracing::debug!(execution_ref = %execution_ref, "Execution started, polling status");

        let mut shutdown = self.shutdown.clone();
        for attempt in 1..=self.max_attempts {
            let status = self.check_status(&execution_ref).await?;
            match status.as_str() {
                "SUCCEEDED" => {
                    tracing::debug!(
                        execution_ref = %execution_ref,
                        attempts = attempt,
                        "Execution succeeded"
                    );
                    return self.fetch_output(&execution_ref).await;
                }
                "FAILED" | "TIMED_OUT" | "ABORTED" => {
                    tracing::warn!(
                        execution_ref = %execution_ref,
                        status = %status,
                        "Execution finished in a non-success state"
                    );
                    return Err(BrokerError::execution_failed(status.clone()));
                }
                _ => {
                    if attempt == self.max_attempts {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        _ = shutdown.changed() => {
                            tracing::info!(
                                execution_ref = %execution_ref,
                                "Shutdown requested, abandoning poll"
                            );
                            return Err(BrokerError::transport("polling cancelled by shutdown"));
                        }
                    }
                }
            }
        }

        tracing::warn!(
            execution_ref = %execution_ref,
            attempts = self.max_attempts,
            "Poll budget exhausted, execution still running"
        );
        Err(BrokerError::ExecutionTimedOut {
            attempts: self.max_attempts,
        })
    }
}
