// Execution coordinator
// Decision: The coordinator is the only caller of a transport. It owns the
// validate -> invoke -> normalize pipeline and always returns a canonical
// result; transport failures become `Failure` results, never propagated
// errors, so callers have one shape to handle.

use std::sync::Arc;

use palaver_core::{normalize, ExecutionPayload, ExecutionResult};
use tracing::warn;

use crate::transport::WorkflowTransport;

pub struct ExecutionCoordinator {
    transport: Arc<dyn WorkflowTransport>,
}

impl ExecutionCoordinator {
    pub fn new(transport: Arc<dyn WorkflowTransport>) -> Self {
        Self { transport }
    }

    /// Run one turn end to end. Invalid payloads fail fast without touching
    /// the transport.
    pub async fn execute(&self, payload: &ExecutionPayload) -> ExecutionResult {
        if let Err(err) = payload.validate() {
            warn!(error = %err, "Rejecting invalid execution payload");
            return ExecutionResult::from_error(&err);
        }

        match self.transport.invoke(payload).await {
            Ok(raw) => normalize(raw),
            Err(err) => {
                warn!(error = %err, "Workflow invocation failed");
                ExecutionResult::from_error(&err)
            }
        }
    }
}
