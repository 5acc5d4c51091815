//! Turn handling.
//!
//! One call to [`Dispatcher::handle_turn`] is one conversational turn: the
//! user's utterance and exactly one assistant reply are appended to the
//! session, and the session's escalation flag is updated from the reply.

use crate::error::PipelineFailure;
use crate::escalation::requires_human;
use crate::message::Message;
use crate::pipeline::ModelPipeline;
use crate::session::ConversationSession;
use crate::tool::ToolSet;
use courier_core::TurnId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// System instructions used when none are configured.
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are an assistant that helps manage emails and performs web searches.";

/// What the pipeline produced for a turn, before it becomes display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReply {
    Answer(String),
    Failed(PipelineFailure),
}

impl TurnReply {
    /// Renders the reply shown to the user.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Answer(text) => text,
            Self::Failed(failure) => format!("An error occurred: {failure}"),
        }
    }
}

impl From<Result<String, PipelineFailure>> for TurnReply {
    fn from(result: Result<String, PipelineFailure>) -> Self {
        match result {
            Ok(text) => Self::Answer(text),
            Err(failure) => Self::Failed(failure),
        }
    }
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub reply_text: String,
    /// True if the reply says the request cannot be completed autonomously.
    pub ask_human: bool,
}

/// Runs turns against a pipeline and a bound tool set.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<dyn ModelPipeline>,
    tools: Arc<ToolSet>,
    instructions: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        pipeline: Arc<dyn ModelPipeline>,
        tools: Arc<ToolSet>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            tools,
            instructions: instructions.into(),
        }
    }

    #[must_use]
    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Handles one user utterance.
    ///
    /// Pipeline failures do not escape: they become an
    /// `"An error occurred: ..."` reply and the turn completes normally.
    #[instrument(skip_all, fields(session_id = %session.id, turn_id = %TurnId::new()))]
    pub async fn handle_turn(
        &self,
        session: &mut ConversationSession,
        utterance: &str,
    ) -> TurnOutcome {
        session.add_message(Message::user(utterance));

        let result = self
            .pipeline
            .run(session.messages(), &self.tools, &self.instructions)
            .await;

        match &result {
            Ok(output) => info!(tool_calls = output.tool_calls.len(), "turn answered"),
            Err(failure) => warn!(error = %failure, "pipeline failed"),
        }
        let reply = TurnReply::from(result.map(|output| output.reply));

        let reply_text = reply.into_text();
        let ask_human = requires_human(&reply_text);
        if ask_human {
            info!("reply requires human follow-up");
        }

        session.add_message(Message::assistant(reply_text.clone()));
        session.set_awaiting_human(ask_human);

        TurnOutcome {
            reply_text,
            ask_human,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.tools)
            .field("instructions", &self.instructions)
            .finish_non_exhaustive()
    }
}
