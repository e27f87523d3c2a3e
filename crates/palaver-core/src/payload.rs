// Workflow execution payload
//
// One payload per turn. `conversation_id` is absent on the first turn and
// carries the id assigned by the engine on every turn after that.

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Input handed to the remote workflow engine for one conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    /// The user's utterance
    pub human_input: String,
    /// Client identifier the bot runs under
    pub client: String,
    /// Bot identifier
    pub bot: String,
    /// Sender identifier (phone number on messaging channels)
    pub cellphone: String,
    /// Conversation id from a previous turn, absent on the first turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ExecutionPayload {
    /// Check that every required field is present and non-empty.
    ///
    /// Called by the coordinator before the remote invocation so a bad
    /// payload never costs a remote call.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("human_input", &self.human_input),
            ("client", &self.client),
            ("bot", &self.bot),
            ("cellphone", &self.cellphone),
        ] {
            if value.trim().is_empty() {
                return Err(BrokerError::invalid_field(name));
            }
        }
        Ok(())
    }
}
