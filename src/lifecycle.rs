//! Orchestrator Lifecycle (C15): the composition root. Builds every
//! collaborator from [`CoreConfig`], wires C4's audio pipeline into C9's
//! event handling, and owns the externally-visible [`AssistantStatus`]
//! machine (§4.15).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audio::capture::CpalCapture;
use crate::audio::pipeline::{AudioPipeline, AudioPipelineHandle};
use crate::config::CoreConfig;
use crate::conversation::SessionInfo;
use crate::error::{CoreError, Result};
use crate::host::protocol::Event;
use crate::inline::{FormatKind, InlineResult, InlineTransforms, RewriteTone};
use crate::llm::factory::ProviderFactory;
use crate::llm::provider::ProviderAdapter;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::pipeline::coordinator::PipelineOrchestrator;
use crate::pipeline::messages::{AssistantStatus, AudioChunk, AudioEvent, PipelineResult};
use crate::stt::ExternalSttAdapter;
use crate::tools::NullToolBroker;
use crate::tts::{ExternalTts, TtsAdapter};

/// Outbound event broadcast capacity (§6.1 `EVENT: ` lines). Matches the
/// host bridge's event-forwarder pattern: a lagging subscriber drops the
/// oldest events rather than blocking the dispatcher.
const EVENT_BROADCAST_CAPACITY: usize = 128;

const DEFAULT_TTS_BINARY: &str = "tts-synthesize";

/// Tracks the current [`AssistantStatus`] and forwards every transition both
/// to an optional caller-installed callback (`set_status_callback`) and to a
/// broadcast channel the host bridge's `STATUS: ` forwarder subscribes to.
struct StatusBoard {
    current: StdMutex<AssistantStatus>,
    callback: StdMutex<Option<Arc<dyn Fn(AssistantStatus) + Send + Sync>>>,
    broadcast: tokio::sync::broadcast::Sender<AssistantStatus>,
}

impl StatusBoard {
    fn new() -> Arc<Self> {
        let (broadcast, _) = tokio::sync::broadcast::channel(EVENT_BROADCAST_CAPACITY);
        Arc::new(Self {
            current: StdMutex::new(AssistantStatus::Initializing),
            callback: StdMutex::new(None),
            broadcast,
        })
    }

    fn set(&self, status: AssistantStatus) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = status;
        if let Some(cb) = self.callback.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            cb(status);
        }
        let _ = self.broadcast.send(status);
    }

    fn get(&self) -> AssistantStatus {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handles for the background work started by [`Lifecycle::start`], torn
/// down by [`Lifecycle::stop`] in reverse order.
struct RunningHandles {
    capture_cancel: CancellationToken,
    capture_thread: std::thread::JoinHandle<()>,
    pipeline_task: JoinHandle<()>,
    dispatcher_task: JoinHandle<()>,
}

/// Composition root: builds C5/C6/C8/C10 adapters, owns C9, and drives C4's
/// Monitor/Capture state machine into it. One instance per process.
pub struct Lifecycle {
    config: CoreConfig,
    status: Arc<StatusBoard>,
    metrics: Arc<MetricsCollector>,
    orchestrator: Arc<PipelineOrchestrator>,
    /// Same provider C9 uses for the pipeline's LLM stage, kept here so
    /// C13's text-transform commands can call it directly (§4.14: inline
    /// commands bypass the audio pipeline but still use C6).
    inline_provider: Arc<dyn ProviderAdapter>,
    tts: Arc<dyn TtsAdapter>,
    events: tokio::sync::broadcast::Sender<Event>,
    metrics_cancel: CancellationToken,
    metrics_task: StdMutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    audio_handle: StdMutex<Option<AudioPipelineHandle>>,
    handles: StdMutex<Option<RunningHandles>>,
}

impl Lifecycle {
    /// Build every collaborator from `config`. Fallible only on malformed
    /// LLM backend configuration (missing model/API key/base URL); audio
    /// and wake-word problems are deferred to [`Self::initialize`] and
    /// [`Self::start`], which degrade gracefully instead.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let state_dir = crate::config::default_state_dir();

        let factory = ProviderFactory::new();
        let backend_settings = config.llm.active_backend_settings();
        let provider: Arc<dyn ProviderAdapter> = factory
            .build(&config.llm.backend, &backend_settings)
            .map_err(CoreError::Llm)?;

        let fallback_provider = if config.error_handling.fallback.use_cloud_api_on_local_failure {
            let fallback_backend = if config.llm.backend == "local" { "openai" } else { "local" };
            let fallback_settings = config
                .llm
                .backends
                .get(fallback_backend)
                .cloned()
                .unwrap_or_default();
            factory.build(fallback_backend, &fallback_settings).ok()
        } else {
            None
        };

        let stt: Arc<dyn crate::stt::SttAdapter> =
            Arc::new(ExternalSttAdapter::new(&config.stt, &state_dir));

        let tts_settings = config.tts.active_engine_settings();
        let tts: Arc<dyn TtsAdapter> = Arc::new(ExternalTts::new(
            &tts_settings,
            &config.audio,
            PathBuf::from(DEFAULT_TTS_BINARY),
        ));

        let metrics = MetricsCollector::new();
        let status = StatusBoard::new();

        let inline_provider = Arc::clone(&provider);
        let hook_status = Arc::clone(&status);
        let orchestrator = PipelineOrchestrator::new(
            stt,
            provider,
            fallback_provider,
            Arc::new(NullToolBroker),
            Arc::clone(&tts),
            &config.conversation,
            Arc::clone(&metrics),
            config.error_handling.clone(),
        )
        .with_speaking_hook(Arc::new(move || hook_status.set(AssistantStatus::Speaking)));

        let (events, _) = tokio::sync::broadcast::channel(EVENT_BROADCAST_CAPACITY);

        Ok(Self {
            config,
            status,
            metrics,
            orchestrator: Arc::new(orchestrator),
            inline_provider,
            tts,
            events,
            metrics_cancel: CancellationToken::new(),
            metrics_task: StdMutex::new(None),
            running: AtomicBool::new(false),
            audio_handle: StdMutex::new(None),
            handles: StdMutex::new(None),
        })
    }

    /// A lightweight readiness check: confirms an input audio device is
    /// reachable. Does not fail hard capture/wake-word problems are
    /// allowed to degrade at `start()` time instead, the same way the
    /// wake-word spotter falls back to hotkey-only on init failure.
    pub fn initialize(&self) -> bool {
        match CpalCapture::list_input_devices() {
            Ok(devices) if !devices.is_empty() => {
                info!(count = devices.len(), "audio input devices available");
                true
            }
            Ok(_) => {
                warn!("no audio input devices found");
                false
            }
            Err(e) => {
                warn!("failed to enumerate audio input devices: {e}");
                false
            }
        }
    }

    /// Install a callback invoked on every [`AssistantStatus`] transition.
    pub fn set_status_callback(&self, callback: Arc<dyn Fn(AssistantStatus) + Send + Sync>) {
        *self.status.callback.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    pub fn get_status(&self) -> AssistantStatus {
        self.status.get()
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Subscribe to `EVENT: ` broadcasts (`wake_word_detected`,
    /// `processing_complete`). A lagging subscriber silently misses the
    /// oldest queued events rather than blocking the dispatcher; the host
    /// bridge logs a warning when that happens.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Subscribe to every [`AssistantStatus`] transition, for the host
    /// bridge's `STATUS: ` forwarder (§6.1).
    pub fn subscribe_status(&self) -> tokio::sync::broadcast::Receiver<AssistantStatus> {
        self.status.broadcast.subscribe()
    }

    pub async fn get_conversation_info(&self) -> SessionInfo {
        self.orchestrator.conversation_info().await
    }

    pub fn interrupt(&self) {
        self.orchestrator.interrupt();
    }

    pub async fn clear_conversation(&self) {
        self.orchestrator.clear_conversation().await;
    }

    fn inline(&self) -> InlineTransforms<'_> {
        InlineTransforms::new(self.inline_provider.as_ref(), &self.config.inline_ai)
    }

    pub async fn rewrite_text(&self, text: &str, tone: RewriteTone) -> InlineResult {
        self.inline().rewrite(text, tone).await
    }

    pub async fn summarize_text(&self, text: &str, max_sentences: usize) -> InlineResult {
        self.inline().summarize(text, max_sentences).await
    }

    pub async fn proofread_text(&self, text: &str, show_changes: bool) -> InlineResult {
        self.inline().proofread(text, show_changes).await
    }

    pub async fn format_text(&self, text: &str, kind: FormatKind) -> InlineResult {
        self.inline().format(text, kind).await
    }

    pub async fn compose_text(
        &self,
        prompt: &str,
        context: Option<&str>,
        max_length: Option<usize>,
        temperature: Option<f64>,
    ) -> InlineResult {
        self.inline().compose(prompt, context, max_length, temperature).await
    }

    /// A cloneable handle for triggering capture (e.g. from the control
    /// protocol's `start`/hotkey path) if the pipeline is running.
    pub fn audio_handle(&self) -> Option<AudioPipelineHandle> {
        self.audio_handle.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Run one utterance through the pipeline directly, bypassing the
    /// audio capture thread entirely (§4.15 "programmatic triggering").
    pub async fn process_audio(&self, samples: Vec<i16>, sample_rate: u32) -> PipelineResult {
        let duration_s = samples.len() as f32 / sample_rate.max(1) as f32;
        self.status.set(AssistantStatus::Processing);
        let result = self
            .orchestrator
            .process_audio_event(AudioEvent::UtteranceReady {
                samples,
                sample_rate,
                duration_s,
            })
            .await;
        let _ = self.events.send(Event::ProcessingComplete {
            success: result.success,
            transcription: result.transcription.clone(),
            response: result.response.clone(),
            error: result.error.clone(),
            duration_ms: result.duration_ms,
        });
        self.status.set(if self.running.load(Ordering::Acquire) {
            AssistantStatus::Listening
        } else {
            AssistantStatus::Idle
        });
        result
    }

    /// Start capturing: spins up the audio capture thread, the
    /// Monitor/Capture state machine, and the dispatcher that feeds its
    /// events into the orchestrator. A no-op if already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("start() called while already running, ignoring");
            return;
        }

        if self.metrics_task.lock().unwrap_or_else(|e| e.into_inner()).is_none()
            && self.config.performance.enable_metrics
        {
            let metrics = Arc::clone(&self.metrics);
            let cancel = self.metrics_cancel.clone();
            let interval = std::time::Duration::from_secs(self.config.performance.metrics_log_interval_seconds);
            let task = tokio::spawn(async move {
                metrics.run_periodic_summary(interval, cancel).await;
            });
            *self.metrics_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        }

        let audio_config = self.config.audio.clone();
        let wakeword = crate::wakeword::MfccDtwWakeWord::build(&audio_config.wakeword_config(), audio_config.sample_rate);
        let vad = Box::new(crate::vad::EnergyVad::new(&audio_config));
        let pipeline = AudioPipeline::new(&audio_config, wakeword, vad);

        *self.audio_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(pipeline.handle());

        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>(64);
        let (event_tx, mut event_rx) = mpsc::channel::<AudioEvent>(16);

        let capture_cancel = CancellationToken::new();
        let capture_thread = spawn_capture_thread(audio_config, chunk_tx, capture_cancel.clone());

        let pipeline_task = tokio::spawn(async move {
            pipeline.run(chunk_rx, event_tx).await;
        });

        let orchestrator = Arc::clone(&self.orchestrator);
        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        let dispatcher_task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    AudioEvent::WakeTriggered { trigger, .. } => {
                        info!(?trigger, "wake event");
                        status.set(AssistantStatus::Listening);
                        let _ = events.send(Event::WakeWordDetected);
                    }
                    AudioEvent::UtteranceReady { .. } => {
                        status.set(AssistantStatus::Processing);
                        let result = orchestrator.process_audio_event(event).await;
                        if !result.success {
                            warn!(error = ?result.error, "pipeline request failed");
                        }
                        let _ = events.send(Event::ProcessingComplete {
                            success: result.success,
                            transcription: result.transcription,
                            response: result.response,
                            error: result.error,
                            duration_ms: result.duration_ms,
                        });
                        status.set(AssistantStatus::Listening);
                    }
                    AudioEvent::Error { cause } => {
                        error!("audio pipeline error: {cause}");
                        status.set(AssistantStatus::Error);
                    }
                }
            }
        });

        *self.handles.lock().unwrap_or_else(|e| e.into_inner()) = Some(RunningHandles {
            capture_cancel,
            capture_thread,
            pipeline_task,
            dispatcher_task,
        });

        self.status.set(AssistantStatus::Listening);
    }

    /// Stop capturing. Cancels the capture thread, waits for the
    /// Monitor/Capture task and dispatcher to drain, and returns to `Idle`.
    /// A no-op if not running.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        *self.audio_handle.lock().unwrap_or_else(|e| e.into_inner()) = None;

        if let Some(handles) = self.handles.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handles.capture_cancel.cancel();
            if let Err(e) = handles.capture_thread.join() {
                error!(?e, "audio capture thread panicked");
            }
            handles.pipeline_task.abort();
            handles.dispatcher_task.abort();
        }

        self.status.set(AssistantStatus::Idle);
    }

    /// Stop capturing (if running), close the TTS engine, and stop the
    /// metrics logger, in that reverse-construction order.
    pub async fn cleanup(&self) {
        self.stop();
        self.tts.close().await;
        self.metrics_cancel.cancel();
        if let Some(task) = self.metrics_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = task.await;
        }
        self.status.set(AssistantStatus::Stopped);
    }
}

fn spawn_capture_thread(
    config: crate::config::AudioConfig,
    tx: mpsc::Sender<AudioChunk>,
    cancel: CancellationToken,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("voxcore-audio-capture".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("failed to build audio capture runtime: {e}");
                    return;
                }
            };
            rt.block_on(async move {
                match CpalCapture::new(&config) {
                    Ok(capture) => {
                        if let Err(e) = capture.run(tx, cancel).await {
                            error!("audio capture failed: {e}");
                        }
                    }
                    Err(e) => error!("failed to open audio device: {e}"),
                }
            });
        })
        .expect("spawn audio capture thread")
}
