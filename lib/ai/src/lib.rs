//! Model access for the courier assistant.
//!
//! This crate provides:
//!
//! - **Backend**: provider-neutral chat request/response types and the
//!   `LlmBackend` trait
//! - **Tools**: definitions offered to the model and the calls it makes
//! - **OpenAI**: a chat-completions backend with function tools

pub mod backend;
pub mod error;
pub mod openai;
pub mod tool;

pub use backend::{LlmBackend, LlmMessage, LlmRequest, LlmResponse, MessageRole, TokenUsage};
pub use error::LlmError;
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use tool::{ToolCallRequest, ToolDefinition};
