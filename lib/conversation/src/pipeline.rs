//! The model-plus-tools pipeline that answers a turn.

use crate::error::PipelineFailure;
use crate::message::Message;
use crate::tool::{ToolCallRecord, ToolInvocationResult, ToolSet};
use async_trait::async_trait;
use courier_ai::{LlmBackend, LlmMessage, LlmRequest, ToolCallRequest};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Default bound on model round trips per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 15;

/// Final answer of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The model's final text.
    pub reply: String,
    /// Every tool call made on the way, in order.
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Produces a reply for a conversation history.
#[async_trait]
pub trait ModelPipeline: Send + Sync {
    /// Answers the last message of `history`.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] if no answer could be produced.
    async fn run(
        &self,
        history: &[Message],
        tools: &ToolSet,
        instructions: &str,
    ) -> Result<PipelineOutput, PipelineFailure>;
}

/// Pipeline that lets the model call tools until it answers.
///
/// Each iteration is one model call. When the model asks for tools they are
/// invoked in order and their results appended as tool messages before the
/// next call.
#[derive(Debug)]
pub struct ToolCallingPipeline<B> {
    backend: B,
    max_iterations: u32,
}

impl<B: LlmBackend> ToolCallingPipeline<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Sets the maximum iterations. Clamped to at least one.
    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn call_tool(&self, call: &ToolCallRequest, tools: &ToolSet) -> ToolCallRecord {
        let started = Instant::now();
        let (input, outcome) = match call.input() {
            Ok(input) => {
                let outcome = tools.invoke(&call.name, input.clone()).await;
                (input, outcome)
            }
            Err(e) => (
                JsonValue::Null,
                ToolInvocationResult::Failure(format!(
                    "invalid arguments for tool '{}': {e}",
                    call.name
                )),
            ),
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            tool = %call.name,
            success = outcome.is_success(),
            latency_ms,
            "tool call finished"
        );

        ToolCallRecord {
            tool_name: call.name.clone(),
            input,
            outcome,
            latency_ms,
        }
    }
}

#[async_trait]
impl<B: LlmBackend> ModelPipeline for ToolCallingPipeline<B> {
    #[instrument(skip_all, fields(model = self.backend.model(), history = history.len()))]
    async fn run(
        &self,
        history: &[Message],
        tools: &ToolSet,
        instructions: &str,
    ) -> Result<PipelineOutput, PipelineFailure> {
        let mut request = LlmRequest::new(history.iter().map(Message::to_llm).collect())
            .with_system(instructions)
            .with_tools(tools.definitions());
        let mut records = Vec::new();

        for iteration in 1..=self.max_iterations {
            let response = self
                .backend
                .generate(&request)
                .await
                .map_err(|e| PipelineFailure::Backend {
                    reason: e.to_string(),
                })?;

            if !response.wants_tools() {
                if response.content.trim().is_empty() {
                    return Err(PipelineFailure::EmptyResponse);
                }
                debug!(iteration, tool_calls = records.len(), "model answered");
                return Ok(PipelineOutput {
                    reply: response.content,
                    tool_calls: records,
                });
            }

            debug!(
                iteration,
                requested = response.tool_calls.len(),
                "model requested tools"
            );
            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let record = self.call_tool(call, tools).await;
                results.push(LlmMessage::tool_result(
                    call.id.clone(),
                    record.outcome.to_model_text(),
                ));
                records.push(record);
            }

            request.messages.push(LlmMessage::assistant_tool_calls(
                response.content,
                response.tool_calls,
            ));
            request.messages.extend(results);
        }

        Err(PipelineFailure::IterationLimit {
            max: self.max_iterations,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tool::tests::EchoTool;
    use courier_ai::{LlmError, LlmResponse, MessageRole, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Backend that replays scripted responses and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
        requests: Mutex<Vec<LlmRequest>>,
        calls: AtomicUsize,
        repeat_tool_call: bool,
    }

    impl ScriptedBackend {
        pub(crate) fn new(script: Vec<Result<LlmResponse, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        /// A backend that never stops asking for the echo tool.
        pub(crate) fn looping() -> Self {
            Self {
                repeat_tool_call: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn last_request(&self) -> LlmRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    pub(crate) fn text(content: &str) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
            usage: TokenUsage::default(),
            model: "scripted".to_string(),
        })
    }

    pub(crate) fn calls_tool(id: &str, name: &str, arguments: &str) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest::new(id, name, arguments)],
            usage: TokenUsage::default(),
            model: "scripted".to_string(),
        })
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.repeat_tool_call {
                return calls_tool(&format!("call_{call}"), "echo", r#"{"text": "again"}"#);
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| text("script exhausted"))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn echo_tools() -> (ToolSet, Arc<EchoTool>) {
        let echo = Arc::new(EchoTool::default());
        (ToolSet::new().with_tool(echo.clone()), echo)
    }

    #[tokio::test]
    async fn plain_answer_needs_one_call() {
        let pipeline = ToolCallingPipeline::new(ScriptedBackend::new(vec![text("Hello!")]));
        let (tools, _) = echo_tools();

        let output = pipeline
            .run(&[Message::user("hi")], &tools, "be brief")
            .await
            .unwrap();

        assert_eq!(output.reply, "Hello!");
        assert!(output.tool_calls.is_empty());
        let request = pipeline.backend().last_request();
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_before_the_answer() {
        let pipeline = ToolCallingPipeline::new(ScriptedBackend::new(vec![
            calls_tool("call_1", "echo", r#"{"text": "ping"}"#),
            text("The tool said ping."),
        ]));
        let (tools, echo) = echo_tools();

        let output = pipeline
            .run(&[Message::user("echo ping")], &tools, "")
            .await
            .unwrap();

        assert_eq!(output.reply, "The tool said ping.");
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.tool_calls.len(), 1);
        assert!(output.tool_calls[0].outcome.is_success());

        let request = pipeline.backend().last_request();
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[1].role, MessageRole::Assistant);
        assert_eq!(request.messages[1].tool_calls[0].id, "call_1");
        assert_eq!(request.messages[2].role, MessageRole::Tool);
        assert_eq!(request.messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert!(request.messages[2].content.contains("ping"));
    }

    #[tokio::test]
    async fn tool_failure_is_fed_back_as_text() {
        let pipeline = ToolCallingPipeline::new(ScriptedBackend::new(vec![
            calls_tool("call_1", "echo", r#"{"fail": true}"#),
            text("The tool failed, sorry."),
        ]));
        let (tools, _) = echo_tools();

        let output = pipeline.run(&[Message::user("x")], &tools, "").await.unwrap();

        assert_eq!(output.reply, "The tool failed, sorry.");
        assert!(!output.tool_calls[0].outcome.is_success());
        let fed_back = &pipeline.backend().last_request().messages[2].content;
        assert!(fed_back.starts_with("Error: "));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_are_fed_back() {
        let pipeline = ToolCallingPipeline::new(ScriptedBackend::new(vec![
            calls_tool("call_1", "nope", "{}"),
            calls_tool("call_2", "echo", "{not json"),
            text("done"),
        ]));
        let (tools, echo) = echo_tools();

        let output = pipeline.run(&[Message::user("x")], &tools, "").await.unwrap();

        assert_eq!(output.tool_calls.len(), 2);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(output.tool_calls[1].input, JsonValue::Null);
        let messages = pipeline.backend().last_request().messages;
        assert!(messages[2].content.contains("tool not found: nope"));
        assert!(messages[4].content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn iteration_limit_is_a_failure() {
        let pipeline = ToolCallingPipeline::new(ScriptedBackend::looping()).with_max_iterations(3);
        let (tools, echo) = echo_tools();

        let err = pipeline.run(&[Message::user("x")], &tools, "").await.unwrap_err();

        assert_eq!(err, PipelineFailure::IterationLimit { max: 3 });
        assert_eq!(pipeline.backend().calls(), 3);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_answer_is_a_failure() {
        let pipeline = ToolCallingPipeline::new(ScriptedBackend::new(vec![text("  ")]));

        let err = pipeline
            .run(&[Message::user("x")], &ToolSet::new(), "")
            .await
            .unwrap_err();

        assert_eq!(err, PipelineFailure::EmptyResponse);
    }

    #[tokio::test]
    async fn backend_error_is_a_failure() {
        let pipeline = ToolCallingPipeline::new(ScriptedBackend::new(vec![Err(LlmError::Timeout)]));

        let err = pipeline
            .run(&[Message::user("x")], &ToolSet::new(), "")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PipelineFailure::Backend {
                reason: "LLM request timed out".to_string()
            }
        );
    }
}
