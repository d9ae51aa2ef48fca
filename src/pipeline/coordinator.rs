//! Pipeline Orchestrator (C9): drives one end-to-end request through
//! STT (C5) → LLM with a tool-calling loop (C6, C8) → TTS (C10), recording
//! per-stage metrics (C12) and consulting the error policy (C11) on
//! failures (§4.9).

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConversationConfig, ErrorHandlingConfig};
use crate::conversation::{ConversationStore, SessionInfo};
use crate::error::CoreError;
use crate::llm::provider::{CompletionResult, ProviderAdapter, ToolDefinition, to_assistant_tool_calls};
use crate::llm::types::RequestOptions;
use crate::metrics::MetricsCollector;
use crate::pipeline::messages::{AudioEvent, PipelineResult, RequestTimer};
use crate::policy::{self, PolicyAction, Stage};
use crate::stt::{AudioInput, SttAdapter, TranscriptionResult};
use crate::tools::ToolBroker;
use crate::tts::TtsAdapter;

/// Orchestrates one pipeline request at a time (§5: the assistant never
/// runs two requests concurrently). Owns the conversation store; every
/// other collaborator is a shared adapter reached through its trait object.
pub struct PipelineOrchestrator {
    stt: Arc<dyn SttAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    fallback_provider: Option<Arc<dyn ProviderAdapter>>,
    tools: Arc<dyn ToolBroker>,
    tts: Arc<dyn TtsAdapter>,
    conversation: Mutex<ConversationStore>,
    metrics: Arc<MetricsCollector>,
    error_handling: ErrorHandlingConfig,
    max_tool_iterations: usize,
    /// Cancelled by `interrupt()` to abort an in-flight backoff sleep; a
    /// fresh child is installed at the start of every request.
    interrupt_token: StdMutex<CancellationToken>,
    /// Invoked just before the TTS stage starts speaking, so a caller
    /// driving the assistant's externally-visible status can transition to
    /// `Speaking` without this orchestrator knowing about that type.
    on_speaking: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stt: Arc<dyn SttAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        fallback_provider: Option<Arc<dyn ProviderAdapter>>,
        tools: Arc<dyn ToolBroker>,
        tts: Arc<dyn TtsAdapter>,
        conversation_config: &ConversationConfig,
        metrics: Arc<MetricsCollector>,
        error_handling: ErrorHandlingConfig,
    ) -> Self {
        Self {
            stt,
            provider,
            fallback_provider,
            tools,
            tts,
            conversation: Mutex::new(ConversationStore::new(conversation_config)),
            metrics,
            max_tool_iterations: conversation_config.max_tool_iterations,
            error_handling,
            interrupt_token: StdMutex::new(CancellationToken::new()),
            on_speaking: None,
        }
    }

    /// Register a callback invoked at the start of the TTS stage of every
    /// request, so a caller can mirror the transition into its own
    /// externally-visible assistant status.
    #[must_use]
    pub fn with_speaking_hook(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_speaking = Some(hook);
        self
    }

    /// Stop an in-flight TTS utterance immediately and unblock any pending
    /// retry backoff. Does not cancel an in-flight LLM or tool call; those
    /// run to completion per §4.9.
    pub fn interrupt(&self) {
        self.tts.stop();
        if let Ok(token) = self.interrupt_token.lock() {
            token.cancel();
        }
    }

    pub async fn clear_conversation(&self) {
        self.conversation.lock().await.clear();
    }

    pub async fn conversation_info(&self) -> SessionInfo {
        self.conversation.lock().await.session_info()
    }

    /// Run one `UtteranceReady` event through the full pipeline. Other
    /// [`AudioEvent`] variants are not processed here; callers forward only
    /// `UtteranceReady` into this method.
    pub async fn process_audio_event(&self, event: AudioEvent) -> PipelineResult {
        let AudioEvent::UtteranceReady {
            samples,
            sample_rate,
            ..
        } = event
        else {
            return PipelineResult::failure("process_audio_event called with a non-utterance event");
        };

        let cancel_token = {
            let fresh = CancellationToken::new();
            let mut guard = self.interrupt_token.lock().unwrap_or_else(|e| e.into_inner());
            *guard = fresh.clone();
            fresh
        };

        let mut timer = RequestTimer::start();
        let mut tool_calls_made = 0u32;

        let transcription = match self.run_stt(samples, sample_rate, &mut timer).await {
            Ok(text) => text,
            Err(result) => {
                self.metrics
                    .record_request(false, std::time::Duration::from_millis(timer.total_ms()));
                return result;
            }
        };

        if transcription.text.trim().is_empty() {
            warn!("empty transcription, skipping LLM/TTS stages");
            self.metrics
                .record_request(false, std::time::Duration::from_millis(timer.total_ms()));
            return PipelineResult::failure("No speech detected");
        }

        let final_content = match self
            .run_llm_tool_loop(&transcription.text, &mut timer, &cancel_token, &mut tool_calls_made)
            .await
        {
            Ok(content) => content,
            Err(result) => {
                self.metrics
                    .record_request(false, std::time::Duration::from_millis(timer.total_ms()));
                return result;
            }
        };

        self.run_tts(&final_content, &mut timer).await;

        let elapsed = std::time::Duration::from_millis(timer.total_ms());
        self.metrics.record_request(true, elapsed);

        PipelineResult {
            success: true,
            transcription: Some(transcription.text),
            response: Some(final_content),
            error: None,
            tool_calls_made,
            duration_ms: timer.total_ms(),
            per_stage_ms: timer.into_stage_durations(),
        }
    }

    async fn run_stt(
        &self,
        samples: Vec<i16>,
        sample_rate: u32,
        timer: &mut RequestTimer,
    ) -> Result<TranscriptionResult, PipelineResult> {
        let scoped = self.metrics.timer("stt");
        let start = std::time::Instant::now();
        let result = self
            .stt
            .transcribe(AudioInput {
                samples,
                sample_rate,
                language: String::new(),
            })
            .await;
        timer.record("stt", start.elapsed());

        match result {
            Ok(transcription) => Ok(transcription),
            Err(e) => {
                scoped.mark_failure();
                let action = policy::classify(Stage::Stt, &e);
                warn!(?action, "stt stage failed: {e}");
                Err(PipelineResult::failure(policy::user_message(Stage::Stt, &self.error_handling)))
            }
        }
    }

    /// Runs the LLM↔tool round-trip loop, capped at `max_tool_iterations`
    /// provider calls (P8). Returns the final assistant text, having
    /// already appended every round (including the final one) to the
    /// conversation store.
    async fn run_llm_tool_loop(
        &self,
        user_text: &str,
        timer: &mut RequestTimer,
        cancel: &CancellationToken,
        tool_calls_made: &mut u32,
    ) -> Result<String, PipelineResult> {
        let mut conversation = self.conversation.lock().await;
        conversation.add_user(user_text);

        let mut iterations = 0usize;
        let mut result: CompletionResult;
        loop {
            iterations += 1;
            let messages = conversation.messages().to_vec();
            let tools = self.tools.list_tools().await.unwrap_or_default();

            result = match self.complete_with_retry(&messages, &tools, timer, cancel).await {
                Ok(r) => r,
                Err(message) => return Err(PipelineResult::failure(message)),
            };

            if !result.has_tool_calls() {
                break;
            }
            if iterations >= self.max_tool_iterations {
                warn!(
                    max_tool_iterations = self.max_tool_iterations,
                    "tool loop reached its iteration cap, returning the last result"
                );
                break;
            }

            conversation.add_assistant(result.content.clone(), to_assistant_tool_calls(&result));
            for tool_call in &result.tool_calls {
                let scoped = self.metrics.timer(format!("tool_{}", tool_call.name));
                let start = std::time::Instant::now();
                let outcome = self.tools.call_tool(&tool_call.name, tool_call.arguments.clone()).await;
                timer.record(format!("tool_{}", tool_call.name), start.elapsed());
                let content = match outcome {
                    Ok(text) => text,
                    Err(e) => {
                        scoped.mark_failure();
                        warn!(tool = %tool_call.name, "tool call failed: {e}");
                        format!("Error: {e}")
                    }
                };
                conversation.add_tool(tool_call.name.clone(), content, tool_call.id.clone());
                *tool_calls_made += 1;
            }
        }

        conversation.add_assistant(result.content.clone(), to_assistant_tool_calls(&result));
        Ok(result.content)
    }

    /// One LLM round trip with retry/fallback per C11's classification of
    /// `Stage::Llm` failures: retry with backoff up to `max_retries`, then
    /// fall back to the configured fallback provider if one is set.
    async fn complete_with_retry(
        &self,
        messages: &[crate::llm::message::Message],
        tools: &[ToolDefinition],
        timer: &mut RequestTimer,
        cancel: &CancellationToken,
    ) -> Result<CompletionResult, String> {
        let options = RequestOptions::new();
        let mut attempt = 0u32;

        loop {
            let scoped = self.metrics.timer("llm");
            let start = std::time::Instant::now();
            let outcome = self.provider.complete(messages, &options, tools).await;
            timer.record("llm", start.elapsed());

            match outcome {
                Ok(result) => return Ok(result),
                Err(e) => {
                    scoped.mark_failure();
                    let core_err: CoreError = e.into();
                    let action = policy::classify(Stage::Llm, &core_err);
                    warn!(?action, "llm stage failed: {core_err}");

                    match action {
                        PolicyAction::Retry => {
                            if !self.error_handling.retry_on_failure || attempt >= self.error_handling.max_retries {
                                return self.try_fallback(messages, &options, tools, timer).await;
                            }
                            let delay = policy::backoff_delay(attempt);
                            attempt += 1;
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = cancel.cancelled() => {
                                    return Err(policy::user_message(Stage::Llm, &self.error_handling));
                                }
                            }
                        }
                        _ => return Err(policy::user_message(Stage::Llm, &self.error_handling)),
                    }
                }
            }
        }
    }

    async fn try_fallback(
        &self,
        messages: &[crate::llm::message::Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
        timer: &mut RequestTimer,
    ) -> Result<CompletionResult, String> {
        let Some(fallback) = &self.fallback_provider else {
            return Err(policy::user_message(Stage::Llm, &self.error_handling));
        };
        info!("retries exhausted, trying fallback provider");
        let scoped = self.metrics.timer("llm_fallback");
        let start = std::time::Instant::now();
        let outcome = fallback.complete(messages, options, tools).await;
        timer.record("llm_fallback", start.elapsed());
        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                scoped.mark_failure();
                warn!("fallback provider also failed: {e}");
                Err(policy::user_message(Stage::Llm, &self.error_handling))
            }
        }
    }

    async fn run_tts(&self, text: &str, timer: &mut RequestTimer) {
        if let Some(hook) = &self.on_speaking {
            hook();
        }
        let scoped = self.metrics.timer("tts");
        let start = std::time::Instant::now();
        let outcome = self.tts.speak(text, true).await;
        timer.record("tts", start.elapsed());
        if let Err(e) = outcome {
            scoped.mark_failure();
            warn!("tts stage failed, response still recorded as successful: {e}");
        }
    }
}
