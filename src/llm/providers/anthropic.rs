//! Anthropic Messages API adapter.
//!
//! Implements [`ProviderAdapter`] for the Anthropic Messages API, normalizing
//! its content-block SSE event flow to the shared [`LlmEvent`] model.
//!
//! # Anthropic SSE event flow
//!
//! ```text
//! message_start → content_block_start → content_block_delta* → content_block_stop
//!              → ... (more content blocks) ...
//!              → message_delta → message_stop
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;

use crate::llm::error::LlmError;
use crate::llm::events::{FinishReason, LlmEvent, TokenUsage};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{LlmEventStream, ProviderAdapter, ToolDefinition};
use crate::llm::providers::sse::SseLineParser;
use crate::llm::types::{EndpointType, ModelRef, RequestOptions};

/// Configuration for the Anthropic adapter.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Anthropic API key.
    pub api_key: String,
    /// Base URL for the API (defaults to `https://api.anthropic.com`).
    pub base_url: String,
    /// Model identifier (e.g. `"claude-sonnet-4-5"`).
    pub model: String,
    /// API version header value.
    pub api_version: String,
}

impl AnthropicConfig {
    /// Create a new Anthropic config.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".into(),
            model: model.into(),
            api_version: "2023-06-01".into(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Anthropic Messages API adapter.
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    /// Create a new adapter from config.
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Anthropic carries the system prompt as a top-level field, not a
    /// message in the array; split it out here.
    fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system = None;
        let mut rest = Vec::with_capacity(messages.len());
        for m in messages {
            if m.role == Role::System && system.is_none() {
                system = Some(m.content.clone());
            } else {
                rest.push(m);
            }
        }
        (system, rest)
    }

    fn build_request_body(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> serde_json::Value {
        let (system, rest) = Self::split_system(messages);

        let messages: Vec<serde_json::Value> = rest
            .into_iter()
            .map(|m| {
                if m.role == Role::Tool {
                    json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                            "content": m.content,
                        }]
                    })
                } else {
                    let role = match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        _ => "user",
                    };
                    if m.tool_calls.is_empty() {
                        json!({ "role": role, "content": m.content })
                    } else {
                        let mut blocks = vec![];
                        if !m.content.is_empty() {
                            blocks.push(json!({ "type": "text", "text": m.content }));
                        }
                        for tc in &m.tool_calls {
                            let input: serde_json::Value =
                                serde_json::from_str(&tc.arguments).unwrap_or(json!({}));
                            blocks.push(json!({
                                "type": "tool_use",
                                "id": tc.call_id,
                                "name": tc.function_name,
                                "input": input,
                            }));
                        }
                        json!({ "role": role, "content": blocks })
                    }
                }
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(4096),
            "temperature": options.temperature,
            "stream": true,
        });

        if let Some(system) = system {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("system".into(), json!(system));
            }
        }

        if !tools.is_empty() {
            let tool_specs: Vec<_> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            if let Some(obj) = body.as_object_mut() {
                obj.insert("tools".into(), json!(tool_specs));
            }
        }

        body
    }
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("model", &self.config.model)
            .finish()
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Anthropic
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<LlmEventStream, LlmError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = self.build_request_body(messages, options, tools);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::TimeoutError(e.to_string())
                } else {
                    LlmError::ConnectionError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimitError(format!(
                "anthropic rate limited (status {status})"
            )));
        }
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::InvalidRequestError(format!(
                "anthropic rejected request (status {status}): {text}"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::LLMError(format!(
                "anthropic request failed (status {status}): {text}"
            )));
        }

        let model_id = self.config.model.clone();
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let request_id = uuid::Uuid::new_v4().to_string();
            yield LlmEvent::StreamStart { request_id, model: ModelRef::new(&model_id) };

            let mut parser = SseLineParser::new();
            let mut block_kinds: HashMap<u64, String> = HashMap::new();
            let mut block_call_ids: HashMap<u64, String> = HashMap::new();
            let mut input_tokens: u32 = 0;

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield LlmEvent::StreamError { error: e.to_string() };
                        return;
                    }
                };
                for event in parser.push(&bytes) {
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&event.data) else {
                        continue;
                    };
                    match value["type"].as_str().unwrap_or_default() {
                        "message_start" => {
                            input_tokens = value["message"]["usage"]["input_tokens"]
                                .as_u64()
                                .unwrap_or(0) as u32;
                        }
                        "content_block_start" => {
                            let idx = value["index"].as_u64().unwrap_or_default();
                            let block = &value["content_block"];
                            let kind = block["type"].as_str().unwrap_or_default().to_string();
                            if kind == "tool_use" {
                                let call_id = block["id"].as_str().unwrap_or_default().to_string();
                                let function_name = block["name"].as_str().unwrap_or_default().to_string();
                                block_call_ids.insert(idx, call_id.clone());
                                yield LlmEvent::ToolCallStart { call_id, function_name };
                            } else if kind == "thinking" {
                                yield LlmEvent::ThinkingStart;
                            }
                            block_kinds.insert(idx, kind);
                        }
                        "content_block_delta" => {
                            let idx = value["index"].as_u64().unwrap_or_default();
                            let delta = &value["delta"];
                            match delta["type"].as_str().unwrap_or_default() {
                                "text_delta" => {
                                    if let Some(text) = delta["text"].as_str() {
                                        yield LlmEvent::TextDelta { text: text.to_string() };
                                    }
                                }
                                "thinking_delta" => {
                                    if let Some(text) = delta["thinking"].as_str() {
                                        yield LlmEvent::ThinkingDelta { text: text.to_string() };
                                    }
                                }
                                "input_json_delta" => {
                                    if let (Some(call_id), Some(args)) =
                                        (block_call_ids.get(&idx), delta["partial_json"].as_str())
                                    {
                                        yield LlmEvent::ToolCallArgsDelta {
                                            call_id: call_id.clone(),
                                            args_fragment: args.to_string(),
                                        };
                                    }
                                }
                                _ => {}
                            }
                        }
                        "content_block_stop" => {
                            let idx = value["index"].as_u64().unwrap_or_default();
                            match block_kinds.get(&idx).map(String::as_str) {
                                Some("tool_use") => {
                                    if let Some(call_id) = block_call_ids.get(&idx) {
                                        yield LlmEvent::ToolCallEnd { call_id: call_id.clone() };
                                    }
                                }
                                Some("thinking") => yield LlmEvent::ThinkingEnd,
                                _ => {}
                            }
                        }
                        "message_delta" => {
                            if let Some(reason) = value["delta"]["stop_reason"].as_str() {
                                let finish_reason = match reason {
                                    "end_turn" => FinishReason::Stop,
                                    "max_tokens" => FinishReason::Length,
                                    "tool_use" => FinishReason::ToolCalls,
                                    _ => FinishReason::Other,
                                };
                                let output_tokens =
                                    value["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;
                                yield LlmEvent::StreamEnd {
                                    finish_reason,
                                    usage: Some(TokenUsage {
                                        prompt_tokens: input_tokens,
                                        completion_tokens: output_tokens,
                                    }),
                                };
                            }
                        }
                        "message_stop" => return,
                        "error" => {
                            let msg = value["error"]["message"].as_str().unwrap_or("anthropic stream error");
                            yield LlmEvent::StreamError { error: msg.to_string() };
                            return;
                        }
                        _ => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
