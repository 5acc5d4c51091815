//! The Gmail tool set exposed to the model.

use crate::client::{GmailClient, GmailMessage, MessageFormat};
use crate::error::GmailError;
use crate::mime::OutgoingMessage;
use async_trait::async_trait;
use courier_ai::ToolDefinition;
use courier_conversation::{Tool, ToolError, ToolSet};
use courier_credential::CredentialRecord;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

pub const SEARCH_GMAIL: &str = "search_gmail";
pub const GET_GMAIL_MESSAGE: &str = "get_gmail_message";
pub const GET_GMAIL_THREAD: &str = "get_gmail_thread";
pub const SEND_GMAIL_MESSAGE: &str = "send_gmail_message";
pub const CREATE_GMAIL_DRAFT: &str = "create_gmail_draft";

const DEFAULT_MAX_RESULTS: u32 = 10;
const MAX_RESULTS_LIMIT: u32 = 100;

/// Gmail tools bound to one credential.
#[derive(Debug, Clone)]
pub struct GmailToolkit {
    client: Arc<GmailClient>,
}

impl GmailToolkit {
    /// Binds the toolkit to `credential`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Gmail client cannot be built.
    pub fn new(credential: &CredentialRecord) -> Result<Self, GmailError> {
        Ok(Self::from_client(GmailClient::new(credential)?))
    }

    #[must_use]
    pub fn from_client(client: GmailClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Returns every Gmail tool as a tool set.
    #[must_use]
    pub fn tool_set(&self) -> ToolSet {
        let mut tools = ToolSet::new();
        self.register_into(&mut tools);
        tools
    }

    /// Adds every Gmail tool to an existing set.
    pub fn register_into(&self, tools: &mut ToolSet) {
        let client = &self.client;
        tools.register(Arc::new(SearchGmail(Arc::clone(client))));
        tools.register(Arc::new(GetGmailMessage(Arc::clone(client))));
        tools.register(Arc::new(GetGmailThread(Arc::clone(client))));
        tools.register(Arc::new(SendGmailMessage(Arc::clone(client))));
        tools.register(Arc::new(CreateGmailDraft(Arc::clone(client))));
    }
}

fn parse_input<T: DeserializeOwned>(tool: &str, input: JsonValue) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::invalid_input(tool, e.to_string()))
}

fn map_gmail_error(tool: &str) -> impl Fn(GmailError) -> ToolError + '_ {
    move |err| ToolError::execution_failed(tool, err.to_string())
}

/// Gmail IDs are hex strings; anything else would end up in the URL path.
fn validate_id<'a>(tool: &str, field: &str, id: &'a str) -> Result<&'a str, ToolError> {
    let id = id.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ToolError::invalid_input(
            tool,
            format!("{field} must be a non-empty alphanumeric Gmail ID"),
        ));
    }
    Ok(id)
}

fn summary(message: &GmailMessage) -> JsonValue {
    json!({
        "id": message.id,
        "thread_id": message.thread_id,
        "subject": message.header("Subject"),
        "from": message.header("From"),
        "date": message.header("Date"),
        "snippet": message.snippet,
    })
}

/// One address or a list of addresses.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Recipients {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(addr) => addr.split(',').map(|a| a.trim().to_string()).collect(),
            Self::Many(addrs) => addrs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ComposeInput {
    to: Recipients,
    subject: String,
    message: String,
    #[serde(default)]
    cc: Recipients,
    #[serde(default)]
    bcc: Recipients,
}

impl ComposeInput {
    fn into_raw(self, tool: &str) -> Result<String, ToolError> {
        OutgoingMessage {
            to: self.to.into_vec(),
            cc: self.cc.into_vec(),
            bcc: self.bcc.into_vec(),
            subject: self.subject,
            body: self.message,
        }
        .to_raw()
        .map_err(|e| ToolError::invalid_input(tool, e.to_string()))
    }
}

fn address_list_schema(description: &str) -> JsonValue {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "description": description,
    })
}

fn compose_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "to": address_list_schema("Recipient email addresses"),
            "subject": { "type": "string", "description": "Subject line" },
            "message": { "type": "string", "description": "Plain-text body" },
            "cc": address_list_schema("Carbon-copy addresses"),
            "bcc": address_list_schema("Blind carbon-copy addresses"),
        },
        "required": ["to", "subject", "message"],
    })
}

struct SearchGmail(Arc<GmailClient>);

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    max_results: Option<u32>,
}

#[async_trait]
impl Tool for SearchGmail {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            SEARCH_GMAIL,
            "Search the user's Gmail with Gmail search syntax (for example \
             'from:alice is:unread newer_than:7d'). Returns message summaries.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Gmail search query" },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of messages to return",
                    "default": DEFAULT_MAX_RESULTS,
                },
            },
            "required": ["query"],
        }))
        .with_output_schema(json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "thread_id": { "type": "string" },
                    "subject": { "type": "string" },
                    "from": { "type": "string" },
                    "date": { "type": "string" },
                    "snippet": { "type": "string" },
                },
            },
        }))
    }

    async fn invoke(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        let input: SearchInput = parse_input(SEARCH_GMAIL, input)?;
        let max_results = input
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_LIMIT);

        let refs = self
            .0
            .list_messages(&input.query, max_results)
            .await
            .map_err(map_gmail_error(SEARCH_GMAIL))?;

        let mut results = Vec::with_capacity(refs.len());
        for message_ref in refs {
            let message = self
                .0
                .get_message(&message_ref.id, MessageFormat::Metadata)
                .await
                .map_err(map_gmail_error(SEARCH_GMAIL))?;
            results.push(summary(&message));
        }
        Ok(JsonValue::Array(results))
    }
}

struct GetGmailMessage(Arc<GmailClient>);

#[derive(Debug, Deserialize)]
struct GetMessageInput {
    message_id: String,
}

#[async_trait]
impl Tool for GetGmailMessage {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            GET_GMAIL_MESSAGE,
            "Fetch one Gmail message by ID, including its plain-text body.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "message_id": { "type": "string", "description": "Gmail message ID" },
            },
            "required": ["message_id"],
        }))
    }

    async fn invoke(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        let input: GetMessageInput = parse_input(GET_GMAIL_MESSAGE, input)?;
        let id = validate_id(GET_GMAIL_MESSAGE, "message_id", &input.message_id)?;

        let message = self
            .0
            .get_message(id, MessageFormat::Full)
            .await
            .map_err(map_gmail_error(GET_GMAIL_MESSAGE))?;

        Ok(json!({
            "id": message.id,
            "thread_id": message.thread_id,
            "subject": message.header("Subject"),
            "from": message.header("From"),
            "to": message.header("To"),
            "date": message.header("Date"),
            "snippet": message.snippet,
            "body": message.payload.plain_text_body().unwrap_or_default(),
        }))
    }
}

struct GetGmailThread(Arc<GmailClient>);

#[derive(Debug, Deserialize)]
struct GetThreadInput {
    thread_id: String,
}

#[async_trait]
impl Tool for GetGmailThread {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            GET_GMAIL_THREAD,
            "Fetch a Gmail thread by ID with a snippet of each message.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "thread_id": { "type": "string", "description": "Gmail thread ID" },
            },
            "required": ["thread_id"],
        }))
    }

    async fn invoke(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        let input: GetThreadInput = parse_input(GET_GMAIL_THREAD, input)?;
        let id = validate_id(GET_GMAIL_THREAD, "thread_id", &input.thread_id)?;

        let thread = self
            .0
            .get_thread(id)
            .await
            .map_err(map_gmail_error(GET_GMAIL_THREAD))?;

        let messages: Vec<JsonValue> = thread
            .messages
            .iter()
            .map(|m| json!({ "id": m.id, "snippet": m.snippet }))
            .collect();
        Ok(json!({ "id": thread.id, "messages": messages }))
    }
}

struct SendGmailMessage(Arc<GmailClient>);

#[async_trait]
impl Tool for SendGmailMessage {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(SEND_GMAIL_MESSAGE, "Send a plain-text email from the user's account.")
            .with_input_schema(compose_schema())
    }

    async fn invoke(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        let input: ComposeInput = parse_input(SEND_GMAIL_MESSAGE, input)?;
        let raw = input.into_raw(SEND_GMAIL_MESSAGE)?;

        let sent = self
            .0
            .send_raw(&raw)
            .await
            .map_err(map_gmail_error(SEND_GMAIL_MESSAGE))?;

        Ok(json!({ "id": sent.id, "thread_id": sent.thread_id }))
    }
}

struct CreateGmailDraft(Arc<GmailClient>);

#[async_trait]
impl Tool for CreateGmailDraft {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            CREATE_GMAIL_DRAFT,
            "Save a plain-text email as a draft in the user's account without sending it.",
        )
        .with_input_schema(compose_schema())
    }

    async fn invoke(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        let input: ComposeInput = parse_input(CREATE_GMAIL_DRAFT, input)?;
        let raw = input.into_raw(CREATE_GMAIL_DRAFT)?;

        let draft = self
            .0
            .create_draft(&raw)
            .await
            .map_err(map_gmail_error(CREATE_GMAIL_DRAFT))?;

        Ok(json!({ "draft_id": draft.id, "message_id": draft.message.id }))
    }
}
