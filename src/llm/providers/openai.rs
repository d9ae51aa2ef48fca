//! OpenAI provider adapter.
//!
//! Targets the Chat Completions API (`/v1/chat/completions`) with
//! `stream: true`, normalizing `data: {...}` SSE chunks to the shared
//! [`LlmEvent`](crate::llm::events::LlmEvent) model.
//!
//! # Examples
//!
//! ```rust,no_run
//! use voxcore::llm::providers::openai::{OpenAiConfig, OpenAiAdapter};
//! use voxcore::llm::provider::ProviderAdapter;
//! use voxcore::llm::message::Message;
//! use voxcore::llm::types::RequestOptions;
//!
//! # async fn example() -> Result<(), voxcore::llm::error::LlmError> {
//! let config = OpenAiConfig::new("sk-...", "gpt-4o");
//! let adapter = OpenAiAdapter::new(config);
//!
//! let messages = vec![Message::user("Hello")];
//! let options = RequestOptions::new();
//! let result = adapter.complete(&messages, &options, &[]).await?;
//! # Ok(())
//! # }
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

/// Configuration for the OpenAI adapter.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL (defaults to `https://api.openai.com`).
    pub base_url: String,
    /// The model to use.
    pub model: String,
}

impl OpenAiConfig {
    /// Create a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".into(),
            model: model.into(),
        }
    }

    /// Set a custom base URL (used for OpenAI-compatible gateways).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// OpenAI Chat Completions adapter.
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    /// Create a new adapter from config, building a dedicated HTTP client.
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_request_body(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let mut obj = json!({ "role": role, "content": m.content });
                if let Some(obj_map) = obj.as_object_mut() {
                    if let Some(tool_call_id) = &m.tool_call_id {
                        obj_map.insert("tool_call_id".into(), json!(tool_call_id));
                    }
                    if !m.tool_calls.is_empty() {
                        let calls: Vec<_> = m
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.call_id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.function_name,
                                        "arguments": tc.arguments,
                                    }
                                })
                            })
                            .collect();
                        obj_map.insert("tool_calls".into(), json!(calls));
                    }
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        if !tools.is_empty() {
            let tool_specs: Vec<_> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            if let Some(obj) = body.as_object_mut() {
                obj.insert("tools".into(), json!(tool_specs));
                obj.insert("tool_choice".into(), json!("auto"));
            }
        }

        body
    }
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn endpoint_type(&self) -> EndpointType {
        EndpointType::OpenAI
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<LlmEventStream, LlmError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let body = self.build_request_body(messages, options, tools);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
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
                "openai rate limited (status {status})"
            )));
        }
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::InvalidRequestError(format!(
                "openai rejected request (status {status}): {text}"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::LLMError(format!(
                "openai request failed (status {status}): {text}"
            )));
        }

        let model_id = self.config.model.clone();
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let request_id = uuid::Uuid::new_v4().to_string();
            yield LlmEvent::StreamStart { request_id, model: ModelRef::new(&model_id) };

            let mut parser = SseLineParser::new();
            let mut call_names: HashMap<usize, String> = HashMap::new();
            let mut call_ids: HashMap<usize, String> = HashMap::new();
            let mut pending_finish: Option<FinishReason> = None;

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield LlmEvent::StreamError { error: e.to_string() };
                        return;
                    }
                };
                for event in parser.push(&bytes) {
                    if event.is_done() {
                        continue;
                    }
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&event.data) else {
                        continue;
                    };
                    // The final chunk when `stream_options.include_usage` is
                    // set carries an empty `choices` array and a top-level
                    // `usage` object instead of a delta.
                    if let Some(usage_obj) = value.get("usage").filter(|u| !u.is_null()) {
                        let usage = TokenUsage {
                            prompt_tokens: usage_obj["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                            completion_tokens: usage_obj["completion_tokens"].as_u64().unwrap_or(0) as u32,
                        };
                        if let Some(finish_reason) = pending_finish.take() {
                            yield LlmEvent::StreamEnd { finish_reason, usage: Some(usage) };
                            return;
                        }
                    }
                    let Some(choice) = value["choices"].get(0) else { continue };
                    if let Some(content) = choice["delta"]["content"].as_str() {
                        if !content.is_empty() {
                            yield LlmEvent::TextDelta { text: content.to_string() };
                        }
                    }
                    if let Some(deltas) = choice["delta"]["tool_calls"].as_array() {
                        for tc in deltas {
                            let idx = tc["index"].as_u64().unwrap_or(0) as usize;
                            if let Some(id) = tc["id"].as_str() {
                                call_ids.insert(idx, id.to_string());
                                let name = tc["function"]["name"].as_str().unwrap_or_default();
                                call_names.insert(idx, name.to_string());
                                yield LlmEvent::ToolCallStart {
                                    call_id: id.to_string(),
                                    function_name: name.to_string(),
                                };
                            }
                            if let Some(args) = tc["function"]["arguments"].as_str() {
                                if let Some(call_id) = call_ids.get(&idx) {
                                    yield LlmEvent::ToolCallArgsDelta {
                                        call_id: call_id.clone(),
                                        args_fragment: args.to_string(),
                                    };
                                }
                            }
                        }
                    }
                    if let Some(reason) = choice["finish_reason"].as_str() {
                        for call_id in call_ids.values() {
                            yield LlmEvent::ToolCallEnd { call_id: call_id.clone() };
                        }
                        let finish_reason = match reason {
                            "stop" => FinishReason::Stop,
                            "length" => FinishReason::Length,
                            "tool_calls" => FinishReason::ToolCalls,
                            "content_filter" => FinishReason::ContentFilter,
                            _ => FinishReason::Other,
                        };
                        // Usage, when requested, arrives in a trailing chunk
                        // with an empty `choices` array; hold the reason
                        // until that chunk lands (or the stream just ends).
                        pending_finish = Some(finish_reason);
                    }
                }
            }
            if let Some(finish_reason) = pending_finish {
                yield LlmEvent::StreamEnd { finish_reason, usage: None };
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_system_role_and_tools() {
        let adapter = OpenAiAdapter::new(OpenAiConfig::new("key", "gpt-4o"));
        let messages = vec![Message::system("be helpful"), Message::user("hi")];
        let tool = ToolDefinition::new("ping", "ping", serde_json::json!({}));
        let body = adapter.build_request_body(&messages, &RequestOptions::new(), &[tool]);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "ping");
    }

    #[test]
    fn request_body_omits_tools_when_none_given() {
        let adapter = OpenAiAdapter::new(OpenAiConfig::new("key", "gpt-4o"));
        let body = adapter.build_request_body(&[], &RequestOptions::new(), &[]);
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn connection_error_surfaces_for_unreachable_host() {
        let adapter = OpenAiAdapter::new(
            OpenAiConfig::new("key", "gpt-4o").with_base_url("http://127.0.0.1:1"),
        );
        let result = adapter
            .complete(&[Message::user("hi")], &RequestOptions::new(), &[])
            .await;
        assert!(matches!(result, Err(LlmError::ConnectionError(_))));
    }
}
