// Turn broker service
//
// Receives inbound messages, runs each one against the remote workflow
// engine through the configured transport, recovers whatever the engine
// returns into a canonical result, reconciles the two conversation stores
// and manages per-sender inactivity timers.

pub mod broker;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod reconcile;
pub mod server;
pub mod session;
pub mod transport;

pub use broker::{InboundMessage, TurnBroker};
pub use config::{BrokerConfig, TransportMode};
pub use coordinator::ExecutionCoordinator;
pub use reconcile::StoreReconciler;
pub use session::SessionTimers;
pub use transport::{create_transport, WorkflowTransport};
