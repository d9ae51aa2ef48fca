//! Configuration for the voice assistant core.
//!
//! A single YAML file loaded at startup. Unrecognised keys are ignored;
//! every section falls back to its documented default via `#[serde(default)]`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::llm::factory::BackendSettings;

/// Top-level configuration for the voice assistant core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Process-level settings (logging).
    pub app: AppConfig,
    /// Audio capture, wake word, and VAD settings.
    pub audio: AudioConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Language model backend settings.
    pub llm: LlmSection,
    /// Text-to-speech settings.
    pub tts: TtsSection,
    /// Conversation store settings.
    pub conversation: ConversationConfig,
    /// Metrics and caching settings.
    pub performance: PerformanceConfig,
    /// Error policy settings.
    pub error_handling: ErrorHandlingConfig,
    /// Inline text-transform settings.
    pub inline_ai: InlineAiConfig,
}

impl CoreConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read config {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the YAML is malformed.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| CoreError::Config(format!("invalid config: {e}")))
    }
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Minimum tracing level (e.g. `"info"`, `"debug"`).
    pub log_level: String,
    /// Directory structured logs are written to.
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_dir: default_state_dir().join("logs"),
        }
    }
}

/// Audio capture, wake word, and VAD settings (drives C1-C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz; must be 8000 or 16000.
    pub sample_rate: u32,
    /// Number of input channels. Only mono is supported.
    pub channels: u16,
    /// Duration of pre-roll audio to retain in the ring buffer.
    pub preroll_s: f32,
    /// Input device name, or `None` for the system default.
    pub device_name: Option<String>,
    /// Input device index, used if `device_name` is absent.
    pub device_index: Option<usize>,
    /// RMS energy threshold for the VAD fallback, in `[0,1]`.
    pub vad_threshold: f32,
    /// Minimum contiguous speech duration to count as an utterance.
    pub min_speech_ms: u32,
    /// Minimum contiguous silence duration that ends an utterance.
    pub min_silence_ms: u32,
    /// Hard cap on utterance duration before a truncated end is forced.
    pub max_utterance_s: f32,
    /// Whether the wake-word spotter is active (vs. hotkey-only).
    pub wake_word_enabled: bool,
    /// Access key for a hosted wake-word backend, if applicable.
    pub wake_word_access_key: Option<String>,
    /// Path to wake-word reference recordings or a packaged model.
    pub wake_word_model_path: Option<PathBuf>,
    /// Wake-word detection sensitivity in `[0,1]`.
    pub wake_word_sensitivity: f32,
    /// Whether the programmatic hotkey trigger is enabled.
    pub hotkey_enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            preroll_s: 3.0,
            device_name: None,
            device_index: None,
            vad_threshold: 0.02,
            min_speech_ms: 250,
            min_silence_ms: 700,
            max_utterance_s: 30.0,
            wake_word_enabled: false,
            wake_word_access_key: None,
            wake_word_model_path: None,
            wake_word_sensitivity: 0.5,
            hotkey_enabled: true,
        }
    }
}

impl AudioConfig {
    /// Frame length required for wake-word detection (512 samples at 16kHz).
    pub fn frame_samples(&self) -> usize {
        512
    }

    /// Derive the internal wake-word engine config from this section.
    pub fn wakeword_config(&self) -> crate::wakeword::WakewordConfig {
        crate::wakeword::WakewordConfig {
            enabled: self.wake_word_enabled,
            references_dir: self
                .wake_word_model_path
                .clone()
                .unwrap_or_else(|| default_state_dir().join("wakeword")),
            threshold: self.wake_word_sensitivity,
            num_mfcc: 13,
        }
    }
}

/// Speech-to-text settings (drives C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Identifier of the recognition model to request from the external binary.
    pub model_id: String,
    /// BCP-47 language code, or `"auto"`.
    pub language: String,
    /// Worker threads the external recogniser may use.
    pub threads: usize,
    /// Path to the external STT binary.
    pub binary_path: PathBuf,
    /// Whether to cache transcription results by content hash.
    pub enable_cache: bool,
    /// Whether the adapter applies its own VAD-based silence trimming.
    pub enable_vad: bool,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_id: "default".into(),
            language: "auto".into(),
            threads: 4,
            binary_path: PathBuf::from("stt-recognize"),
            enable_cache: true,
            enable_vad: true,
        }
    }
}

/// Language model backend settings (drives C6's factory).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Tag of the backend to use by default (e.g. `"openai"`, `"anthropic"`, `"local"`).
    pub backend: String,
    /// Per-backend subtables, keyed by backend tag.
    #[serde(flatten)]
    pub backends: HashMap<String, BackendSettings>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: "openai".into(),
            backends: HashMap::new(),
        }
    }
}

impl LlmSection {
    /// Settings for the configured default backend, or an empty default if absent.
    pub fn active_backend_settings(&self) -> BackendSettings {
        self.backends.get(&self.backend).cloned().unwrap_or_default()
    }
}

/// Per-engine TTS voice settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsEngineSettings {
    /// Voice identifier, engine-specific.
    pub voice: Option<String>,
    /// Speaking rate in words per minute, clamped to `[90, 400]`.
    pub rate: Option<u32>,
    /// Output volume in `[0,1]`.
    pub volume: Option<f32>,
}

/// Text-to-speech settings (drives C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSection {
    /// Tag of the engine to use (e.g. `"system"`, `"local"`).
    pub engine: String,
    /// Per-engine subtables, keyed by engine tag.
    #[serde(flatten)]
    pub engines: HashMap<String, TtsEngineSettings>,
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            engine: "system".into(),
            engines: HashMap::new(),
        }
    }
}

impl TtsSection {
    /// Settings for the configured default engine, or an empty default if absent.
    pub fn active_engine_settings(&self) -> TtsEngineSettings {
        self.engines.get(&self.engine).cloned().unwrap_or_default()
    }
}

/// Conversation store settings (drives C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Max conversational turns retained before pruning (I4).
    pub max_history_turns: usize,
    /// Max estimated context tokens retained before pruning (I5).
    pub context_window_tokens: usize,
    /// Leading system message content, if any.
    pub system_prompt: Option<String>,
    /// Idle timeout in minutes before the store resets on next access (I6).
    pub session_timeout_minutes: u64,
    /// Hard cap on LLM↔tool round trips per pipeline request (P8).
    pub max_tool_iterations: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 20,
            context_window_tokens: 8_000,
            system_prompt: None,
            session_timeout_minutes: 30,
            max_tool_iterations: 5,
        }
    }
}

/// Cache settings under `performance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the STT result cache is enabled.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Metrics and caching settings (drives C12).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Whether the metrics collector is active.
    pub enable_metrics: bool,
    /// Interval, in seconds, between periodic metrics summary log lines.
    pub metrics_log_interval_seconds: u64,
    /// STT cache settings.
    pub cache: CacheConfig,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_log_interval_seconds: 60,
            cache: CacheConfig::default(),
        }
    }
}

/// Fallback-provider settings under `error_handling`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Whether to fall back to a cloud API when the local backend fails.
    pub use_cloud_api_on_local_failure: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            use_cloud_api_on_local_failure: false,
        }
    }
}

/// Error policy settings (drives C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    /// Whether retryable failures are retried at all.
    pub retry_on_failure: bool,
    /// Maximum retry attempts for retryable LLM failures.
    pub max_retries: u32,
    /// Whether error phrases are spoken via TTS.
    pub speak_errors: bool,
    /// Per-error-kind phrases spoken when `speak_errors` is true.
    pub error_phrases: HashMap<String, String>,
    /// Cloud fallback settings.
    pub fallback: FallbackConfig,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        let mut error_phrases = HashMap::new();
        error_phrases.insert("stt".into(), "Sorry, I didn't catch that.".into());
        error_phrases.insert("llm".into(), "Sorry, I'm having trouble responding right now.".into());
        error_phrases.insert("audio".into(), "I can't access the microphone right now.".into());
        error_phrases.insert("network".into(), "I'm having trouble connecting right now.".into());
        error_phrases.insert("unknown".into(), "Sorry, something went wrong.".into());
        Self {
            retry_on_failure: true,
            max_retries: 3,
            speak_errors: true,
            error_phrases,
            fallback: FallbackConfig::default(),
        }
    }
}

/// Compose-operation settings under `inline_ai`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeOptions {
    /// Max generated length in characters, advisory for the prompt.
    pub max_length: usize,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self { max_length: 2000 }
    }
}

/// Format/summarize defaults under `inline_ai`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingOptions {
    /// Default summary length in sentences.
    pub summary_length: usize,
    /// Default number of key points to extract.
    pub key_points_count: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            summary_length: 3,
            key_points_count: 5,
        }
    }
}

/// Proofread defaults under `inline_ai`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofreadOptions {
    /// Whether to return a structured change list by default.
    pub show_changes: bool,
}

/// Inline transform settings (drives C13).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineAiConfig {
    /// Default max tokens for inline transform completions.
    pub max_tokens: u32,
    /// Default sampling temperature, overridden per-operation.
    pub temperature: f64,
    /// Compose-specific settings.
    pub compose: ComposeOptions,
    /// Format/summarize-specific settings.
    pub formatting: FormattingOptions,
    /// Proofread-specific settings.
    pub proofread: ProofreadOptions,
}

impl Default for InlineAiConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.5,
            compose: ComposeOptions::default(),
            formatting: FormattingOptions::default(),
            proofread: ProofreadOptions::default(),
        }
    }
}

pub(crate) fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voxcore")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_every_default() {
        let config = CoreConfig::from_yaml("").expect("empty document parses");
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.conversation.max_tool_iterations, 5);
        assert_eq!(config.llm.backend, "openai");
    }

    #[test]
    fn unrecognised_keys_are_ignored() {
        let yaml = "audio:\n  sample_rate: 8000\n  unknown_field: 123\nsomething_else: true\n";
        let config = CoreConfig::from_yaml(yaml).expect("parses despite unknown keys");
        assert_eq!(config.audio.sample_rate, 8000);
    }

    #[test]
    fn llm_backend_subtables_parse_via_flatten() {
        let yaml = "llm:\n  backend: openai\n  openai:\n    model: gpt-4o\n    api_key_env: OPENAI_API_KEY\n";
        let config = CoreConfig::from_yaml(yaml).expect("parses");
        let settings = config.llm.active_backend_settings();
        assert_eq!(settings.model.as_deref(), Some("gpt-4o"));
        assert_eq!(settings.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = CoreConfig::from_yaml("audio: [this is not a mapping");
        assert!(matches!(err, Err(CoreError::Config(_))));
    }

    #[test]
    fn wakeword_config_derives_from_audio_section() {
        let audio = AudioConfig {
            wake_word_enabled: true,
            wake_word_sensitivity: 0.7,
            ..Default::default()
        };
        let wakeword = audio.wakeword_config();
        assert!(wakeword.enabled);
        assert_eq!(wakeword.threshold, 0.7);
    }
}
