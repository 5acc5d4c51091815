//! Conversation handling for the courier assistant.
//!
//! This crate provides:
//!
//! - **Session**: append-only message history with the escalation flag
//! - **Tools**: the bound tool set the model may call
//! - **Pipeline**: the model-plus-tools loop that answers a turn
//! - **Dispatcher**: runs one turn and classifies its outcome

pub mod dispatcher;
pub mod error;
pub mod escalation;
pub mod message;
pub mod pipeline;
pub mod session;
pub mod tool;

pub use dispatcher::{DEFAULT_INSTRUCTIONS, Dispatcher, TurnOutcome, TurnReply};
pub use error::{PipelineFailure, ToolError};
pub use escalation::{ESCALATION_MARKER, requires_human};
pub use message::{Message, MessageRole};
pub use pipeline::{DEFAULT_MAX_ITERATIONS, ModelPipeline, PipelineOutput, ToolCallingPipeline};
pub use session::ConversationSession;
pub use tool::{Tool, ToolCallRecord, ToolInvocationResult, ToolSet};
