//! Tools available during a conversation.
//!
//! A `ToolSet` is built once, already bound to whatever credentials its
//! tools need, and handed to the dispatcher. Invocation never fails at the
//! set level: unknown tools and tool errors come back as
//! [`ToolInvocationResult::Failure`] so the model can read them.

use crate::error::ToolError;
use async_trait::async_trait;
use courier_ai::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Trait for tool execution.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid or the operation fails.
    async fn invoke(&self, input: JsonValue) -> Result<JsonValue, ToolError>;
}

/// Outcome of one tool invocation, as fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ToolInvocationResult {
    Success(JsonValue),
    Failure(String),
}

impl ToolInvocationResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Renders the result as the text of a tool message.
    #[must_use]
    pub fn to_model_text(&self) -> String {
        match self {
            Self::Success(JsonValue::String(text)) => text.clone(),
            Self::Success(value) => value.to_string(),
            Self::Failure(description) => format!("Error: {description}"),
        }
    }
}

/// Record of a single tool call made while answering a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// The tool that was invoked.
    pub tool_name: String,
    /// Input provided to the tool. Null if the model's arguments were
    /// not valid JSON.
    pub input: JsonValue,
    pub outcome: ToolInvocationResult,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// The set of tools bound for a session.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    /// Creates a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its definition's name, replacing any tool of
    /// the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    /// Adds a tool.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Returns all tool definitions, ordered by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invokes the named tool, capturing any failure as text.
    pub async fn invoke(&self, name: &str, input: JsonValue) -> ToolInvocationResult {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model requested an unknown tool");
            return ToolInvocationResult::Failure(
                ToolError::NotFound {
                    name: name.to_string(),
                }
                .to_string(),
            );
        };

        match tool.invoke(input).await {
            Ok(output) => ToolInvocationResult::Success(output),
            Err(err) => {
                warn!(tool = name, error = %err, "tool invocation failed");
                ToolInvocationResult::Failure(err.to_string())
            }
        }
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
