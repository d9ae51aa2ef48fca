//! Error Policy (C11): a pure, synchronous classifier mapping stage
//! failures onto one of `{retry, fallback, skip, abort, ask_user}` (§4.11).
//! No I/O; the orchestrator (C9) drives retry loops and fallback dispatch
//! from the actions this module returns.

use std::time::Duration;

use crate::config::ErrorHandlingConfig;
use crate::error::CoreError;
use crate::llm::LlmError;

/// The stage a failure originated in, matching §4.11's taxonomy rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Stt,
    Llm,
    Tool,
    Tts,
    Audio,
    Network,
    Unknown,
}

impl Stage {
    fn phrase_key(self) -> &'static str {
        match self {
            Self::Stt => "stt",
            Self::Llm => "llm",
            Self::Tool => "unknown",
            Self::Tts => "unknown",
            Self::Audio => "audio",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

/// What the orchestrator should do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Retry with backoff, up to `max_retries`.
    Retry,
    /// Retries exhausted; try a configured fallback provider.
    Fallback,
    /// Not fatal to the pipeline; proceed without this stage's output.
    Skip,
    /// Surface the error and stop the pipeline for this request.
    Abort,
    /// Needs explicit user action (e.g. grant a permission) before retrying.
    AskUser,
}

/// Retry backoff schedule for LLM connection/timeout/rate-limit failures:
/// initial 1s, base 2, capped at 10s (§4.11).
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64.saturating_mul(1u64 << attempt.min(16));
    Duration::from_secs(secs.min(10))
}

/// Classify a stage failure into a policy action.
pub fn classify(stage: Stage, error: &CoreError) -> PolicyAction {
    match stage {
        Stage::Stt => PolicyAction::Abort,
        Stage::Llm => classify_llm(error),
        Stage::Tool => PolicyAction::Skip,
        Stage::Tts => PolicyAction::Skip,
        Stage::Audio => {
            if is_permission_like(error) {
                PolicyAction::AskUser
            } else {
                PolicyAction::Abort
            }
        }
        Stage::Network => PolicyAction::Retry,
        Stage::Unknown => PolicyAction::Abort,
    }
}

fn classify_llm(error: &CoreError) -> PolicyAction {
    match error {
        CoreError::Llm(llm_err) => match llm_err {
            LlmError::ConnectionError(_) | LlmError::TimeoutError(_) | LlmError::RateLimitError(_) => {
                PolicyAction::Retry
            }
            LlmError::InvalidRequestError(_)
            | LlmError::AuthError(_)
            | LlmError::ConfigError(_)
            | LlmError::LLMError(_) => PolicyAction::Abort,
        },
        _ => PolicyAction::Abort,
    }
}

fn is_permission_like(error: &CoreError) -> bool {
    matches!(error, CoreError::Audio(msg) if msg.to_lowercase().contains("permission"))
}

/// The phrase to speak (or log) for a failed stage, per the configured
/// `error_phrases` table, falling back to the generic "unknown" phrase.
pub fn user_message(stage: Stage, config: &ErrorHandlingConfig) -> String {
    config
        .error_phrases
        .get(stage.phrase_key())
        .or_else(|| config.error_phrases.get("unknown"))
        .cloned()
        .unwrap_or_else(|| "Sorry, something went wrong.".to_string())
}
