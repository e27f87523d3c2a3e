// HTTP gateway transport
// Decision: The gateway in front of the engine accepts the payload directly
// and replies with the execution output as its response body.

use async_trait::async_trait;
use palaver_core::{BrokerError, ExecutionPayload, RawOutput};

use super::{ensure_success, request_error, WorkflowTransport};

pub struct GatewayTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl GatewayTransport {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl WorkflowTransport for GatewayTransport {
    async fn invoke(&self, payload: &ExecutionPayload) -> Result<RawOutput, BrokerError> {
        payload.validate()?;

        tracing::debug!(endpoint = %self.endpoint, "Submitting execution through gateway");
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response)?;

        let text = response.text().await.map_err(request_error)?;
        Ok(RawOutput::Text(text))
    }
}
