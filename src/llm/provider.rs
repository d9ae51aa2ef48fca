//! Provider adapter trait for LLM backends.
//!
//! Defines the [`ProviderAdapter`] trait every backend implementation
//! satisfies: a low-level streaming `send()` that normalizes provider wire
//! formats into [`LlmEvent`]s, and two higher-level operations built on top
//! of it — [`ProviderAdapter::complete`] (a single awaited result) and
//! [`ProviderAdapter::stream_complete`] (content-only text deltas).
//!
//! # Examples
//!
//! ```rust,no_run
//! use voxcore::llm::provider::ProviderAdapter;
//! use voxcore::llm::message::{Message, Role};
//! use voxcore::llm::types::RequestOptions;
//!
//! async fn example(adapter: &dyn ProviderAdapter) {
//!     let messages = vec![Message::text(Role::User, "Hello")];
//!     let options = RequestOptions::new();
//!     let result = adapter.complete(&messages, &options, &[]).await;
//! }
//! ```

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::events::{FinishReason, LlmEvent};
use super::message::{AssistantToolCall, Message};
use super::types::{EndpointType, RequestOptions};

/// A tool definition provided to the LLM for function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"execute_applescript"`).
    pub name: String,
    /// Human-readable description of the tool's purpose.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A completed tool call with parsed arguments, surfaced on
/// [`CompletionResult::tool_calls`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this call, used to correlate the tool result.
    pub id: String,
    /// The function name the model wants to invoke.
    pub name: String,
    /// Arguments, parsed from the streamed JSON fragments into a value.
    pub arguments: serde_json::Value,
}

/// The outcome of a single (possibly internally-streamed) completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// The assistant's text content (may be empty if only tool calls were made).
    pub content: String,
    /// The model identifier that actually served the request.
    pub model_id: String,
    /// Total tokens used for this request, when the provider reports it.
    pub tokens_used: u32,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Tool calls requested by the model, if any.
    pub tool_calls: Vec<ToolCall>,
    /// Free-form provider metadata (request id, latency, etc.).
    pub metadata: HashMap<String, String>,
}

impl CompletionResult {
    /// Whether the model requested one or more tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A boxed stream of LLM events (the internal, provider-facing vocabulary).
pub type LlmEventStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

/// A boxed stream of content-only text deltas, as returned by
/// [`ProviderAdapter::stream_complete`].
pub type TextDeltaStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Trait for LLM provider adapters.
///
/// Each provider (OpenAI, Anthropic, a local OpenAI-compatible endpoint)
/// implements this trait to normalize its streaming API into the shared
/// [`LlmEvent`] model, then gets `complete()`/`stream_complete()` for free
/// via the default implementations below.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider name (e.g. `"openai"`, `"anthropic"`, `"local"`).
    fn name(&self) -> &str;

    /// The kind of endpoint this adapter targets.
    fn endpoint_type(&self) -> EndpointType;

    /// Send a request to the LLM and return a stream of normalized events.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request cannot be initiated (auth,
    /// network, malformed request). Stream-level errors are delivered as
    /// [`LlmEvent::StreamError`].
    async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<LlmEventStream, LlmError>;

    /// Run a request to completion and return the aggregated result.
    ///
    /// Drains the event stream produced by [`send`](Self::send),
    /// accumulating text, thinking, and tool-call fragments into a single
    /// [`CompletionResult`].
    async fn complete(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, LlmError> {
        let mut stream = self.send(messages, options, tools).await?;

        let mut content = String::new();
        let mut finish_reason = FinishReason::Other;
        let mut model_id = String::new();
        let mut tokens_used = 0u32;
        let mut in_progress: HashMap<String, (String, String)> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        while let Some(event) = stream.next().await {
            match event {
                LlmEvent::StreamStart { model, .. } => model_id = model.model_id,
                LlmEvent::TextDelta { text } => content.push_str(&text),
                LlmEvent::ToolCallStart {
                    call_id,
                    function_name,
                } => {
                    order.push(call_id.clone());
                    in_progress.insert(call_id, (function_name, String::new()));
                }
                LlmEvent::ToolCallArgsDelta {
                    call_id,
                    args_fragment,
                } => {
                    if let Some((_, args)) = in_progress.get_mut(&call_id) {
                        args.push_str(&args_fragment);
                    }
                }
                LlmEvent::ToolCallEnd { .. } => {}
                LlmEvent::StreamEnd {
                    finish_reason: reason,
                    usage,
                } => {
                    finish_reason = reason;
                    tokens_used = usage.map(|u| u.total()).unwrap_or(0);
                }
                LlmEvent::StreamError { error } => {
                    return Err(LlmError::LLMError(error));
                }
                LlmEvent::ThinkingStart | LlmEvent::ThinkingDelta { .. } | LlmEvent::ThinkingEnd => {}
            }
        }

        let tool_calls = order
            .into_iter()
            .filter_map(|id| {
                let (name, args) = in_progress.remove(&id)?;
                let arguments = if args.is_empty() {
                    serde_json::Value::Object(Default::default())
                } else {
                    serde_json::from_str(&args).unwrap_or(serde_json::Value::String(args))
                };
                Some(ToolCall {
                    id,
                    name,
                    arguments,
                })
            })
            .collect();

        Ok(CompletionResult {
            content,
            model_id,
            tokens_used,
            finish_reason,
            tool_calls,
            metadata: HashMap::new(),
        })
    }

    /// Stream only content text deltas (no tool-call or thinking events).
    async fn stream_complete(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<TextDeltaStream, LlmError> {
        let stream = self.send(messages, options, tools).await?;
        let mapped = stream.filter_map(|event| async move {
            match event {
                LlmEvent::TextDelta { text } => Some(Ok(text)),
                LlmEvent::StreamError { error } => Some(Err(LlmError::LLMError(error))),
                _ => None,
            }
        });
        Ok(Box::pin(mapped))
    }

    /// Release any held resources (connections, background tasks). Default
    /// no-op; stateful adapters (e.g. a pooled local endpoint) may override.
    async fn close(&self) {}
}

/// Build [`AssistantToolCall`]s from a [`CompletionResult`]'s tool calls,
/// re-serializing arguments back to a JSON string, for appending to the
/// conversation store.
pub fn to_assistant_tool_calls(result: &CompletionResult) -> Vec<AssistantToolCall> {
    result
        .tool_calls
        .iter()
        .map(|tc| AssistantToolCall {
            call_id: tc.id.clone(),
            function_name: tc.name.clone(),
            arguments: tc.arguments.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ModelRef;

    #[test]
    fn tool_definition_new() {
        let tool = ToolDefinition::new("read", "Read a file", serde_json::json!({}));
        assert_eq!(tool.name, "read");
    }

    struct StubProvider;

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn endpoint_type(&self) -> EndpointType {
            EndpointType::Custom
        }

        async fn send(
            &self,
            _messages: &[Message],
            _options: &RequestOptions,
            _tools: &[ToolDefinition],
        ) -> Result<LlmEventStream, LlmError> {
            let events = vec![
                LlmEvent::StreamStart {
                    request_id: "r1".into(),
                    model: ModelRef::new("stub-model"),
                },
                LlmEvent::TextDelta {
                    text: "hello ".into(),
                },
                LlmEvent::TextDelta {
                    text: "world".into(),
                },
                LlmEvent::StreamEnd {
                    finish_reason: FinishReason::Stop,
                    usage: Some(crate::llm::events::TokenUsage {
                        prompt_tokens: 6,
                        completion_tokens: 2,
                    }),
                },
            ];
            Ok(Box::pin(futures_util::stream::iter(events)))
        }
    }

    #[tokio::test]
    async fn complete_aggregates_text_deltas() {
        let provider = StubProvider;
        let result = provider
            .complete(&[], &RequestOptions::new(), &[])
            .await
            .expect("completes");
        assert_eq!(result.content, "hello world");
        assert_eq!(result.model_id, "stub-model");
        assert_eq!(result.finish_reason, FinishReason::Stop);
        assert_eq!(result.tokens_used, 8);
        assert!(!result.has_tool_calls());
    }

    #[tokio::test]
    async fn stream_complete_yields_only_text_deltas() {
        let provider = StubProvider;
        let mut stream = provider
            .stream_complete(&[], &RequestOptions::new(), &[])
            .await
            .expect("streams");
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            out.push_str(&chunk.expect("no error"));
        }
        assert_eq!(out, "hello world");
    }

    struct ToolCallingProvider;

    #[async_trait]
    impl ProviderAdapter for ToolCallingProvider {
        fn name(&self) -> &str {
            "tool-calling"
        }

        fn endpoint_type(&self) -> EndpointType {
            EndpointType::OpenAI
        }

        async fn send(
            &self,
            _messages: &[Message],
            _options: &RequestOptions,
            _tools: &[ToolDefinition],
        ) -> Result<LlmEventStream, LlmError> {
            let events = vec![
                LlmEvent::ToolCallStart {
                    call_id: "c1".into(),
                    function_name: "execute_applescript".into(),
                },
                LlmEvent::ToolCallArgsDelta {
                    call_id: "c1".into(),
                    args_fragment: r#"{"script":"#.into(),
                },
                LlmEvent::ToolCallArgsDelta {
                    call_id: "c1".into(),
                    args_fragment: r#""activate Safari"}"#.into(),
                },
                LlmEvent::ToolCallEnd {
                    call_id: "c1".into(),
                },
                LlmEvent::StreamEnd {
                    finish_reason: FinishReason::ToolCalls,
                    usage: None,
                },
            ];
            Ok(Box::pin(futures_util::stream::iter(events)))
        }
    }

    #[tokio::test]
    async fn complete_reassembles_tool_call_arguments() {
        let provider = ToolCallingProvider;
        let result = provider
            .complete(&[], &RequestOptions::new(), &[])
            .await
            .expect("completes");
        assert!(result.has_tool_calls());
        assert_eq!(result.tool_calls[0].name, "execute_applescript");
        assert_eq!(
            result.tool_calls[0].arguments["script"],
            serde_json::json!("activate Safari")
        );
    }
}
