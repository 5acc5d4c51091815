//! HTTP routes for the conversational interface.

use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use courier_conversation::{ConversationSession, Dispatcher, Message};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Notice shown alongside replies that need a human.
pub const ESCALATION_NOTICE: &str = "Unable to fulfill the request autonomously.";

/// Shared application state.
///
/// One session per process. Turns are serialized by the session lock.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub session: Mutex<ConversationSession>,
}

impl AppState {
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            session: Mutex::new(ConversationSession::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub utterance: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub reply_text: String,
    pub ask_human: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub awaiting_human: bool,
    pub messages: Vec<Message>,
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/turn", post(turn))
        .route("/api/session", get(session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Runs one conversational turn.
#[instrument(skip_all)]
async fn turn(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    if request.utterance.trim().is_empty() {
        return Err(ApiError::BlankUtterance);
    }

    let mut session = state.session.lock().await;
    let outcome = state
        .dispatcher
        .handle_turn(&mut session, &request.utterance)
        .await;

    if outcome.ask_human {
        info!(session_id = %session.id, "turn needs a human");
    }

    Ok(Json(TurnResponse {
        notice: outcome.ask_human.then(|| ESCALATION_NOTICE.to_string()),
        reply_text: outcome.reply_text,
        ask_human: outcome.ask_human,
    }))
}

async fn session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    let session = state.session.lock().await;
    Json(SessionView {
        id: session.id.to_string(),
        awaiting_human: session.awaiting_human(),
        messages: session.messages().to_vec(),
    })
}
