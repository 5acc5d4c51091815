//! OpenAI-compatible chat-completions backend.
//!
//! Works with OpenAI and any provider that implements the
//! `/chat/completions` API with function tools.

use crate::backend::{LlmBackend, LlmMessage, LlmRequest, LlmResponse, MessageRole, TokenUsage};
use crate::error::LlmError;
use crate::tool::{ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use reqwest::{StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for the OpenAI backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    120
}

impl OpenAiConfig {
    /// Creates a configuration with defaults for everything but the key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: 0.0,
            max_tokens: None,
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// OpenAI chat-completions backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Creates a backend from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is blank or the HTTP client cannot
    /// be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "api_key is required".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: format!("HTTP client error: {e}"),
            })?;

        Ok(Self { config, http })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body<'a>(&'a self, request: &'a LlmRequest) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: Some(system),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.extend(request.messages.iter().map(WireMessage::from_message));

        ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.or(self.config.max_tokens),
            tools: request.tools.iter().map(WireTool::from_definition).collect(),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    #[instrument(
        skip_all,
        fields(model = %self.config.model, messages = request.messages.len(), tools = request.tools.len())
    )]
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.request_body(request);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await.map_err(transport_error)?;
        let parsed = parse_response(&text)?;
        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            tool_calls = parsed.tool_calls.len(),
            "completion received"
        );
        Ok(parsed)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::RequestFailed {
            reason: err.to_string(),
        }
    }
}

fn parse_response(body: &str) -> Result<LlmResponse, LlmError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::ResponseParseFailed {
            reason: e.to_string(),
        })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ResponseParseFailed {
            reason: "response contained no choices".to_string(),
        })?;

    let usage = response.usage.unwrap_or_default();
    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_request)
            .collect(),
        usage: TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
        model: response.model,
    })
}

// Wire types

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> WireMessage<'a> {
    fn from_message(message: &'a LlmMessage) -> Self {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        // An assistant turn that only calls tools carries null content.
        let content = if message.content.is_empty() && !message.tool_calls.is_empty() {
            None
        } else {
            Some(message.content.as_str())
        };

        Self {
            role,
            content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(WireToolCall::from_request)
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec<'a>,
}

#[derive(Serialize)]
struct WireFunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a JsonValue,
}

impl<'a> WireTool<'a> {
    fn from_definition(definition: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunctionSpec {
                name: &definition.name,
                description: &definition.description,
                parameters: &definition.input_schema,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl WireToolCall {
    fn from_request(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }

    fn into_request(self) -> ToolCallRequest {
        ToolCallRequest::new(self.id, self.function.name, self.function.arguments)
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, routing::post};
    use std::sync::{Arc, Mutex};

    const TOOL_CALL_RESPONSE: &str = r#"{
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4-0613",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": {
                        "name": "search_gmail",
                        "arguments": "{\"query\": \"is:unread\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 82, "completion_tokens": 17, "total_tokens": 99}
    }"#;

    fn backend(base_url: &str) -> OpenAiBackend {
        OpenAiBackend::new(OpenAiConfig::new("sk-test").with_base_url(base_url)).unwrap()
    }

    #[test]
    fn config_defaults() {
        let config: OpenAiConfig = serde_json::from_str(r#"{"api_key": "sk-test"}"#).unwrap();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, None);
        assert_eq!(config.request_timeout_seconds, 120);
        assert!(!format!("{config:?}").contains("sk-test"));
    }

    #[test]
    fn config_requires_api_key() {
        assert!(serde_json::from_str::<OpenAiConfig>("{}").is_err());
        let err = OpenAiBackend::new(OpenAiConfig::new("  ")).unwrap_err();
        assert!(matches!(err, LlmError::InvalidConfig { .. }));
    }

    #[test]
    fn request_body_carries_system_tools_and_tool_turns() {
        let backend = backend("http://localhost");
        let call = ToolCallRequest::new("call_abc", "search_gmail", r#"{"query":"x"}"#);
        let request = LlmRequest::new(vec![
            LlmMessage::user("find x"),
            LlmMessage::assistant_tool_calls("", vec![call]),
            LlmMessage::tool_result("call_abc", "[]"),
        ])
        .with_system("be helpful")
        .with_tools(vec![ToolDefinition::new("search_gmail", "Search mail")]);

        let body = serde_json::to_value(backend.request_body(&request)).unwrap();

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["content"], JsonValue::Null);
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["name"],
            "search_gmail"
        );
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_abc");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search_gmail");
    }

    #[test]
    fn parses_tool_call_response() {
        let response = parse_response(TOOL_CALL_RESPONSE).unwrap();
        assert!(response.wants_tools());
        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls[0].id, "call_abc");
        assert_eq!(response.tool_calls[0].input().unwrap()["query"], "is:unread");
        assert_eq!(response.usage.total(), 99);
        assert_eq!(response.model, "gpt-4-0613");
    }

    #[test]
    fn parses_text_response_without_usage() {
        let response = parse_response(
            r#"{"choices": [{"message": {"role": "assistant", "content": "Done."}}]}"#,
        )
        .unwrap();
        assert!(!response.wants_tools());
        assert_eq!(response.content, "Done.");
        assert_eq!(response.usage.total(), 0);
    }

    #[test]
    fn rejects_response_without_choices() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, LlmError::ResponseParseFailed { .. }));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn generate_posts_to_chat_completions_with_bearer_key() {
        let seen: Arc<Mutex<Option<(String, JsonValue)>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<JsonValue>| {
                let captured = Arc::clone(&captured);
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *captured.lock().unwrap() = Some((auth, body));
                    (
                        [("content-type", "application/json")],
                        TOOL_CALL_RESPONSE,
                    )
                }
            }),
        );
        let base_url = serve(app).await;

        let response = backend(&base_url)
            .generate(&LlmRequest::new(vec![LlmMessage::user("anything unread?")]))
            .await
            .unwrap();

        assert_eq!(response.tool_calls.len(), 1);
        let (auth, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["messages"][0]["content"], "anything unread?");
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base_url = serve(app).await;

        let err = backend(&base_url)
            .generate(&LlmRequest::new(vec![LlmMessage::user("hi")]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LlmError::Api {
                status: 401,
                message: "bad key".to_string()
            }
        );
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "7")], "slow down") }),
        );
        let base_url = serve(app).await;

        let err = backend(&base_url)
            .generate(&LlmRequest::new(vec![LlmMessage::user("hi")]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LlmError::RateLimited {
                retry_after_secs: Some(7)
            }
        );
    }
}
