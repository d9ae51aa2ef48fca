//! Integration tests for the OpenAI and Anthropic provider adapters against
//! a mock HTTP server, exercising the full SSE response path rather than
//! hand-built `LlmEvent` streams.

use voxcore::llm::message::Message;
use voxcore::llm::provider::ProviderAdapter;
use voxcore::llm::providers::anthropic::{AnthropicAdapter, AnthropicConfig};
use voxcore::llm::providers::openai::{OpenAiAdapter, OpenAiConfig};
use voxcore::llm::events::FinishReason;
use voxcore::llm::types::RequestOptions;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(events: &[&str]) -> String {
    let mut out = String::new();
    for event in events {
        out.push_str("data: ");
        out.push_str(event);
        out.push_str("\n\n");
    }
    out.push_str("data: [DONE]\n\n");
    out
}

#[tokio::test]
async fn openai_streamed_completion_aggregates_text() {
    let mock_server = MockServer::start().await;

    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"lo!"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":3,"total_tokens":12}}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let adapter = OpenAiAdapter::new(OpenAiConfig::new("test-key", "gpt-4o-mini").with_base_url(mock_server.uri()));
    let messages = vec![Message::user("hi")];
    let result = adapter
        .complete(&messages, &RequestOptions::default(), &[])
        .await
        .expect("completion should succeed against the mock server");

    assert_eq!(result.content, "Hello!");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.tokens_used, 12);
    assert!(!result.has_tool_calls());
}

#[tokio::test]
async fn openai_streamed_tool_call_is_reassembled() {
    let mock_server = MockServer::start().await;

    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_weather","arguments":""}}]}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Paris\"}"}}]}}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let adapter = OpenAiAdapter::new(OpenAiConfig::new("test-key", "gpt-4o-mini").with_base_url(mock_server.uri()));
    let messages = vec![Message::user("weather in paris?")];
    let result = adapter
        .complete(&messages, &RequestOptions::default(), &[])
        .await
        .expect("completion should succeed against the mock server");

    assert!(result.has_tool_calls());
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].name, "get_weather");
    assert_eq!(result.tool_calls[0].arguments, "{\"city\":\"Paris\"}");
    assert_eq!(result.finish_reason, FinishReason::ToolCalls);
}

#[tokio::test]
async fn openai_rate_limit_status_maps_to_rate_limit_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let adapter = OpenAiAdapter::new(OpenAiConfig::new("test-key", "gpt-4o-mini").with_base_url(mock_server.uri()));
    let messages = vec![Message::user("hi")];
    let err = adapter
        .complete(&messages, &RequestOptions::default(), &[])
        .await
        .expect_err("429 should surface as an error");

    assert!(err.is_retryable());
    assert_eq!(err.code(), "RATE_LIMIT_ERROR");
}

#[tokio::test]
async fn anthropic_streamed_completion_aggregates_text_and_thinking() {
    let mock_server = MockServer::start().await;

    let body = sse_body(&[
        r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":14,"output_tokens":1}}}"#,
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"considering..."}}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"content_block_start","index":1,"content_block":{"type":"text"}}"#,
        r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Bonjour!"}}"#,
        r#"{"type":"content_block_stop","index":1}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":4}}"#,
        r#"{"type":"message_stop"}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let adapter =
        AnthropicAdapter::new(AnthropicConfig::new("test-key", "claude-3-5-sonnet").with_base_url(mock_server.uri()));
    let messages = vec![Message::user("say hi in french")];
    let result = adapter
        .complete(&messages, &RequestOptions::default(), &[])
        .await
        .expect("completion should succeed against the mock server");

    assert_eq!(result.content, "Bonjour!");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.tokens_used, 18);
}

#[tokio::test]
async fn anthropic_server_error_maps_to_llm_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&mock_server)
        .await;

    let adapter =
        AnthropicAdapter::new(AnthropicConfig::new("test-key", "claude-3-5-sonnet").with_base_url(mock_server.uri()));
    let messages = vec![Message::user("hi")];
    let err = adapter
        .complete(&messages, &RequestOptions::default(), &[])
        .await
        .expect_err("500 should surface as an error");

    assert!(!err.is_retryable());
    assert_eq!(err.code(), "LLM_ERROR");
}
