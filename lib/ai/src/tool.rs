//! Tool definitions offered to the model and the calls it makes.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Definition of a tool available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name of the tool.
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON schema for the tool's input parameters.
    pub input_schema: JsonValue,
    /// JSON schema for the tool's output.
    pub output_schema: Option<JsonValue>,
}

impl ToolDefinition {
    /// Creates a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
            output_schema: None,
        }
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = schema;
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: JsonValue) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// A tool invocation requested by the model.
///
/// Arguments are kept as the raw JSON text the model produced; models do
/// emit malformed JSON, and that has to reach the caller as a tool failure
/// rather than a backend error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call identifier.
    pub id: String,
    /// The tool name.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decodes the arguments. Blank arguments decode to an empty object.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are not valid JSON.
    pub fn input(&self) -> Result<JsonValue, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition_builder() {
        let tool = ToolDefinition::new("search_gmail", "Search the mailbox")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                },
                "required": ["query"]
            }))
            .with_output_schema(serde_json::json!({
                "type": "array"
            }));

        assert_eq!(tool.name, "search_gmail");
        assert!(tool.output_schema.is_some());
    }

    #[test]
    fn tool_call_input_decodes_arguments() {
        let call = ToolCallRequest::new("call_1", "search_gmail", r#"{"query": "from:bob"}"#);
        assert_eq!(call.input().unwrap()["query"], "from:bob");

        let blank = ToolCallRequest::new("call_2", "search_gmail", "");
        assert_eq!(blank.input().unwrap(), serde_json::json!({}));

        let broken = ToolCallRequest::new("call_3", "search_gmail", "{query:");
        assert!(broken.input().is_err());
    }
}
