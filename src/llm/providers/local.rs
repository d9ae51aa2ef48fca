//! Local OpenAI-compatible provider adapter.
//!
//! Targets a locally-hosted, OpenAI-compatible chat completions endpoint
//! (Ollama, llama.cpp server, vLLM, etc.). Request/response shape is
//! identical to [`OpenAiAdapter`](super::openai::OpenAiAdapter); the only
//! difference is the endpoint type reported and that no API key is required
//! by default.

use async_trait::async_trait;

use crate::llm::error::LlmError;
use crate::llm::message::Message;
use crate::llm::provider::{LlmEventStream, ProviderAdapter, ToolDefinition};
use crate::llm::providers::openai::{OpenAiAdapter, OpenAiConfig};
use crate::llm::types::{EndpointType, RequestOptions};

/// Configuration for a local OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Base URL of the local server (e.g. `"http://localhost:11434"`).
    pub base_url: String,
    /// The model to use.
    pub model: String,
    /// Optional API key, for endpoints that still require one.
    pub api_key: Option<String>,
}

impl LocalConfig {
    /// Create a new local endpoint config.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Attach an API key, for gateways that require one even locally.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Local OpenAI-compatible endpoint adapter.
///
/// Delegates wire handling entirely to [`OpenAiAdapter`], since the two
/// speak the identical chat-completions streaming protocol.
pub struct LocalAdapter {
    inner: OpenAiAdapter,
}

impl LocalAdapter {
    /// Create a new adapter from config.
    pub fn new(config: LocalConfig) -> Self {
        let openai_config = OpenAiConfig::new(config.api_key.unwrap_or_default(), config.model)
            .with_base_url(config.base_url);
        Self {
            inner: OpenAiAdapter::new(openai_config),
        }
    }
}

impl std::fmt::Debug for LocalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAdapter").finish()
    }
}

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    fn name(&self) -> &str {
        "local"
    }

    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Local
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<LlmEventStream, LlmError> {
        self.inner.send(messages, options, tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_adapter_reports_local_endpoint_type() {
        let adapter = LocalAdapter::new(LocalConfig::new("http://localhost:11434", "llama3:8b"));
        assert_eq!(adapter.endpoint_type(), EndpointType::Local);
        assert_eq!(adapter.name(), "local");
    }
}
