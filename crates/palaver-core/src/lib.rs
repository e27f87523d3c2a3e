// Turn Brokering Core
//
// Domain types and defensive response recovery for brokering a single
// conversational turn against a remote workflow engine.
//
// Key design decisions:
// - `ExecutionResult` serializes to exactly the engine's wire envelope, so
//   normalization is idempotent on canonical input
// - The normalizer is a pure ordered fallback chain; each repair stage is
//   independently testable and the chain never throws
// - Store and channel collaborators are narrow async traits; backends live
//   in palaver-storage, transports in palaver-broker

pub mod error;
pub mod normalize;
pub mod payload;
pub mod result;
pub mod traits;

// Re-exports for convenience
pub use error::{BrokerError, Result};
pub use normalize::{normalize, RawOutput};
pub use payload::ExecutionPayload;
pub use result::{ExecutionResult, FailureDetails, SuccessDetails};
pub use traits::{BotProfile, ConversationArchive, ConversationDirectory, OutboundChannel};
