//! Error types for the LLM provider module.
//!
//! Every variant carries a stable SCREAMING_SNAKE_CASE code (via [`LlmError::code`])
//! that is safe to match on programmatically, embedded at the front of the
//! `Display` output as `[CODE] message`.

use thiserror::Error;

/// Errors a [`ProviderAdapter`](super::provider::ProviderAdapter) can raise.
///
/// Maps directly onto the provider error taxonomy: `ConnectionError`,
/// `TimeoutError`, `RateLimitError`, `InvalidRequestError`, and a generic
/// `LLMError` catch-all.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    /// Network/transport failure reaching the provider.
    #[error("[CONNECTION_ERROR] {0}")]
    ConnectionError(String),

    /// The request did not complete within the provider's timeout.
    #[error("[TIMEOUT_ERROR] {0}")]
    TimeoutError(String),

    /// The provider reported a rate limit (HTTP 429 or equivalent).
    #[error("[RATE_LIMIT_ERROR] {0}")]
    RateLimitError(String),

    /// The request was rejected as malformed (bad schema, unsupported field).
    #[error("[INVALID_REQUEST_ERROR] {0}")]
    InvalidRequestError(String),

    /// Authentication failed (missing/invalid API key).
    #[error("[AUTH_ERROR] {0}")]
    AuthError(String),

    /// Configuration error (missing required field for the selected backend).
    #[error("[CONFIG_ERROR] {0}")]
    ConfigError(String),

    /// Any other provider failure not covered above.
    #[error("[LLM_ERROR] {0}")]
    LLMError(String),
}

impl LlmError {
    /// Stable SCREAMING_SNAKE_CASE error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::TimeoutError(_) => "TIMEOUT_ERROR",
            Self::RateLimitError(_) => "RATE_LIMIT_ERROR",
            Self::InvalidRequestError(_) => "INVALID_REQUEST_ERROR",
            Self::AuthError(_) => "AUTH_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::LLMError(_) => "LLM_ERROR",
        }
    }

    /// Whether the error policy should retry/fall back on this error.
    ///
    /// Connection, timeout, and rate-limit failures are transient; invalid
    /// request, auth, and config failures are not (retrying them wastes a
    /// round-trip for a guaranteed-identical rejection).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_) | Self::TimeoutError(_) | Self::RateLimitError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_error_codes_are_stable_screaming_snake_case() {
        let errors = [
            LlmError::ConnectionError("x".into()),
            LlmError::TimeoutError("x".into()),
            LlmError::RateLimitError("x".into()),
            LlmError::InvalidRequestError("x".into()),
            LlmError::AuthError("x".into()),
            LlmError::ConfigError("x".into()),
            LlmError::LLMError("x".into()),
        ];
        let expected = [
            "CONNECTION_ERROR",
            "TIMEOUT_ERROR",
            "RATE_LIMIT_ERROR",
            "INVALID_REQUEST_ERROR",
            "AUTH_ERROR",
            "CONFIG_ERROR",
            "LLM_ERROR",
        ];
        for (err, code) in errors.iter().zip(expected.iter()) {
            assert_eq!(err.code(), *code);
            assert!(
                err.code()
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c == '_')
            );
            assert!(format!("{err}").starts_with(&format!("[{code}]")));
        }
    }

    #[test]
    fn connection_timeout_and_rate_limit_are_retryable() {
        assert!(LlmError::ConnectionError("x".into()).is_retryable());
        assert!(LlmError::TimeoutError("x".into()).is_retryable());
        assert!(LlmError::RateLimitError("x".into()).is_retryable());
    }

    #[test]
    fn invalid_request_auth_and_config_are_not_retryable() {
        assert!(!LlmError::InvalidRequestError("x".into()).is_retryable());
        assert!(!LlmError::AuthError("x".into()).is_retryable());
        assert!(!LlmError::ConfigError("x".into()).is_retryable());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LlmError>();
    }
}
