//! Fallback provider adapter.
//!
//! Wraps a primary provider with a fallback. When the primary provider
//! returns a retryable error (network failure, timeout, rate limit), the
//! request is transparently retried against the fallback.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::llm::error::LlmError;
use crate::llm::message::Message;
use crate::llm::provider::{LlmEventStream, ProviderAdapter, ToolDefinition};
use crate::llm::types::{EndpointType, RequestOptions};

/// A provider adapter that falls back to a secondary provider on retryable
/// errors from the primary.
///
/// Only invoked when the error policy (C11) determines a retryable LLM
/// failure has exhausted its own retry budget and a fallback provider has
/// been configured.
pub struct FallbackProvider {
    primary: Arc<dyn ProviderAdapter>,
    fallback: Arc<dyn ProviderAdapter>,
    fallback_count: AtomicU32,
}

impl FallbackProvider {
    /// Create a new fallback-enabled provider.
    pub fn new(primary: Arc<dyn ProviderAdapter>, fallback: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            primary,
            fallback,
            fallback_count: AtomicU32::new(0),
        }
    }

    /// Number of times the fallback provider has been activated.
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FallbackProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProvider")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .field("fallback_count", &self.fallback_count())
            .finish()
    }
}

#[async_trait]
impl ProviderAdapter for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    fn endpoint_type(&self) -> EndpointType {
        self.primary.endpoint_type()
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<LlmEventStream, LlmError> {
        match self.primary.send(messages, options, tools).await {
            Ok(stream) => Ok(stream),
            Err(e) if e.is_retryable() => {
                self.fallback_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "primary provider failed with retryable error, falling back"
                );
                self.fallback.send(messages, options, tools).await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::events::{FinishReason, LlmEvent};

    struct SuccessProvider {
        label: &'static str,
    }

    #[async_trait]
    impl ProviderAdapter for SuccessProvider {
        fn name(&self) -> &str {
            self.label
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
            Ok(Box::pin(futures_util::stream::iter(vec![
                LlmEvent::StreamEnd {
                    finish_reason: FinishReason::Stop,
                    usage: None,
                },
            ])))
        }
    }

    struct RetryableErrorProvider;

    #[async_trait]
    impl ProviderAdapter for RetryableErrorProvider {
        fn name(&self) -> &str {
            "retryable-error"
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
            Err(LlmError::ConnectionError("connection refused".to_string()))
        }
    }

    struct NonRetryableErrorProvider;

    #[async_trait]
    impl ProviderAdapter for NonRetryableErrorProvider {
        fn name(&self) -> &str {
            "non-retryable-error"
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
            Err(LlmError::AuthError("invalid API key".to_string()))
        }
    }

    #[tokio::test]
    async fn primary_success_does_not_use_fallback() {
        let provider = FallbackProvider::new(
            Arc::new(SuccessProvider { label: "primary" }),
            Arc::new(SuccessProvider { label: "fallback" }),
        );
        let result = provider.send(&[], &RequestOptions::new(), &[]).await;
        assert!(result.is_ok());
        assert_eq!(provider.fallback_count(), 0);
    }

    #[tokio::test]
    async fn retryable_error_triggers_fallback() {
        let provider = FallbackProvider::new(
            Arc::new(RetryableErrorProvider),
            Arc::new(SuccessProvider { label: "fallback" }),
        );
        let result = provider.send(&[], &RequestOptions::new(), &[]).await;
        assert!(result.is_ok());
        assert_eq!(provider.fallback_count(), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates() {
        let provider = FallbackProvider::new(
            Arc::new(NonRetryableErrorProvider),
            Arc::new(SuccessProvider { label: "fallback" }),
        );
        let result = provider.send(&[], &RequestOptions::new(), &[]).await;
        assert!(result.is_err());
        assert_eq!(provider.fallback_count(), 0);
    }

    #[test]
    fn name_returns_fallback() {
        let provider = FallbackProvider::new(
            Arc::new(SuccessProvider { label: "primary" }),
            Arc::new(SuccessProvider { label: "local" }),
        );
        assert_eq!(provider.name(), "fallback");
    }
}
