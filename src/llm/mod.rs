//! LLM integration: provider adapters, wire-format normalization, and
//! backend selection for the conversational core.
//!
//! # Submodules
//!
//! - [`error`] — error types with stable error codes
//! - [`types`] — core domain types (endpoints, models, request options)
//! - [`events`] — normalized streaming event model
//! - [`message`] — conversation message and tool-call wire types
//! - [`provider`] — the [`ProviderAdapter`](provider::ProviderAdapter) trait and completion helpers
//! - [`providers`] — concrete backend adapters (OpenAI, Anthropic, local, fallback)
//! - [`factory`] — builds a provider adapter from a configured backend tag
//!
//! # Event model
//!
//! All providers normalize their streaming output to [`events::LlmEvent`],
//! giving callers a single event shape regardless of backend.
//!
//! # Error codes
//!
//! All errors carry a stable code (e.g. `CONNECTION_ERROR`, `AUTH_ERROR`)
//! that is safe to match on programmatically; see [`error::LlmError::code`].

pub mod error;
pub mod events;
pub mod factory;
pub mod message;
pub mod provider;
pub mod providers;
pub mod types;

pub use error::LlmError;
pub use events::{FinishReason, LlmEvent};
pub use factory::{BackendSettings, ProviderFactory};
pub use message::{AssistantToolCall, Message, Role};
pub use provider::{
    CompletionResult, LlmEventStream, ProviderAdapter, TextDeltaStream, ToolCall, ToolDefinition,
    to_assistant_tool_calls,
};
pub use types::{EndpointType, ModelRef, ReasoningLevel, RequestOptions};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct ScriptedProvider {
        events: Vec<LlmEvent>,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
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
            Ok(Box::pin(futures_util::stream::iter(self.events.clone())))
        }
    }

    /// A full event stream (start, thinking, text, tool call, text, end)
    /// aggregates into a single completion with the expected text and tool
    /// call, just as a live provider adapter's stream would.
    #[tokio::test]
    async fn full_event_stream_aggregates_into_completion() {
        let provider = ScriptedProvider {
            events: vec![
                LlmEvent::StreamStart {
                    request_id: "req-1".into(),
                    model: ModelRef::new("claude-opus-4"),
                },
                LlmEvent::ThinkingStart,
                LlmEvent::ThinkingDelta {
                    text: "considering the request".into(),
                },
                LlmEvent::ThinkingEnd,
                LlmEvent::TextDelta {
                    text: "I'll check the weather. ".into(),
                },
                LlmEvent::ToolCallStart {
                    call_id: "tc_1".into(),
                    function_name: "get_weather".into(),
                },
                LlmEvent::ToolCallArgsDelta {
                    call_id: "tc_1".into(),
                    args_fragment: r#"{"city":"#.into(),
                },
                LlmEvent::ToolCallArgsDelta {
                    call_id: "tc_1".into(),
                    args_fragment: r#""Lisbon"}"#.into(),
                },
                LlmEvent::ToolCallEnd {
                    call_id: "tc_1".into(),
                },
                LlmEvent::StreamEnd {
                    finish_reason: FinishReason::ToolCalls,
                    usage: Some(crate::llm::events::TokenUsage {
                        prompt_tokens: 40,
                        completion_tokens: 15,
                    }),
                },
            ],
        };

        let result = provider
            .complete(&[Message::user("what's the weather in Lisbon?")], &RequestOptions::new(), &[])
            .await
            .expect("completion succeeds");

        assert_eq!(result.content, "I'll check the weather. ");
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
        assert_eq!(result.tokens_used, 55);
        assert!(result.has_tool_calls());
        assert_eq!(result.tool_calls[0].name, "get_weather");
        assert_eq!(result.tool_calls[0].arguments["city"], "Lisbon");

        let assistant_calls = to_assistant_tool_calls(&result);
        assert_eq!(assistant_calls.len(), 1);
        assert_eq!(assistant_calls[0].call_id, "tc_1");
    }

    /// Endpoint types all display as lowercase and are pairwise distinct.
    #[test]
    fn endpoint_type_covers_all_backends() {
        let endpoints = [
            EndpointType::OpenAI,
            EndpointType::Anthropic,
            EndpointType::Local,
            EndpointType::Custom,
        ];

        for ep in &endpoints {
            let s = ep.to_string();
            assert_eq!(s, s.to_lowercase());
        }
        for (i, a) in endpoints.iter().enumerate() {
            for (j, b) in endpoints.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }

    /// The factory builds a working adapter for a configured backend tag and
    /// that adapter satisfies the same trait every hand-built adapter does.
    #[test]
    fn factory_built_adapter_implements_provider_adapter() {
        // SAFETY: test-local env var.
        unsafe { std::env::set_var("VOXCORE_TEST_INTEGRATION_KEY", "sk-test") };
        let factory = ProviderFactory::new();
        let settings = BackendSettings {
            model: Some("gpt-4o-mini".into()),
            api_key_env: Some("VOXCORE_TEST_INTEGRATION_KEY".into()),
            ..Default::default()
        };
        let adapter: Arc<dyn ProviderAdapter> =
            factory.build("openai", &settings).expect("builds openai adapter");
        assert_eq!(adapter.endpoint_type(), EndpointType::OpenAI);
        unsafe { std::env::remove_var("VOXCORE_TEST_INTEGRATION_KEY") };
    }
}
