// HTTP surface
// Decision: Inbound messages are acknowledged with 202 before the turn runs;
// the messaging provider's webhook timeout is far shorter than a workflow
// execution, so delivery acknowledgement and turn processing are decoupled.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::broker::{InboundMessage, TurnBroker};

#[derive(Debug, Deserialize)]
pub struct InboundMessageRequest {
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub push_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn create_router(broker: Arc<TurnBroker>) -> Router {
    Router::new()
        .route("/messages", post(receive_message))
        .route("/healthz", get(health))
        .with_state(broker)
}

async fn receive_message(
    State(broker): State<Arc<TurnBroker>>,
    Json(request): Json<InboundMessageRequest>,
) -> StatusCode {
    debug!(from = %request.from, "Inbound message accepted");
    let message = InboundMessage {
        cellphone: request.from,
        body: request.body,
        alias: request.push_name,
    };
    tokio::spawn(async move {
        broker.handle_message(message).await;
    });
    StatusCode::ACCEPTED
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
