//! Top-level error type for the voice assistant core.

use crate::llm::LlmError;

/// Errors produced by any pipeline stage or the control protocol.
///
/// Variants map directly onto the error kinds the error policy (see
/// [`crate::policy`]) classifies: STT, LLM (wrapping [`LlmError`] so its
/// retry classification carries through), Tool, Audio, TTS, Protocol, and
/// Config.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Transcription produced no text, the external recogniser failed, or it timed out.
    #[error("STT error: {0}")]
    Stt(String),

    /// LLM request failure, wrapping the provider-level error taxonomy.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// A tool invocation raised an exception; always rendered back to the
    /// LLM as the tool's result text rather than failing the pipeline.
    #[error("tool error: {0}")]
    Tool(String),

    /// Audio device unavailable, permission denied, or stream open failed.
    #[error("audio error: {0}")]
    Audio(String),

    /// TTS engine unavailable or playback failed.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Malformed input on the control protocol's stdin channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration is invalid or missing a required field. Fatal only at startup.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error (file, subprocess, device).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// A short, stable kind label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stt(_) => "stt",
            Self::Llm(_) => "llm",
            Self::Tool(_) => "tool",
            Self::Audio(_) => "audio",
            Self::Tts(_) => "tts",
            Self::Protocol(_) => "protocol",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

/// Convenience result type for core pipeline operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_converts_via_from() {
        let llm_err = LlmError::TimeoutError("provider took too long".into());
        let core_err: CoreError = llm_err.into();
        assert_eq!(core_err.kind(), "llm");
        assert!(format!("{core_err}").contains("TIMEOUT_ERROR"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::other("disk full");
        let core_err: CoreError = io_err.into();
        assert_eq!(core_err.kind(), "io");
    }

    #[test]
    fn every_kind_has_a_stable_label() {
        let kinds = [
            CoreError::Stt("x".into()).kind(),
            CoreError::Tool("x".into()).kind(),
            CoreError::Audio("x".into()).kind(),
            CoreError::Tts("x".into()).kind(),
            CoreError::Protocol("x".into()).kind(),
            CoreError::Config("x".into()).kind(),
        ];
        for k in kinds {
            assert!(k.chars().all(|c| c.is_ascii_lowercase()));
        }
    }
}
