//! Wire-internal message types passed between the audio pipeline (C4) and
//! the orchestrator (C9): raw capture chunks, audio events, the assistant's
//! display status, and the end-to-end pipeline result.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A chunk of raw audio samples handed from the capture thread to the
/// Monitor/Capture state machine. Produced at the device's native rate and
/// channel count; [`crate::audio::capture`] downsamples/mixes to mono
/// before this point, so every chunk reaching the pipeline is already at
/// the configured `AudioConfig::sample_rate`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples at `sample_rate`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Wall-clock time this chunk was captured.
    pub captured_at: Instant,
}

/// What triggered the transition from Monitor into Capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeTrigger {
    /// The wake-word spotter (C2) detected the keyword.
    Wake,
    /// The programmatic hotkey (`trigger_hotkey()`) fired.
    Hotkey,
}

/// Events emitted by the audio pipeline (C4). Only C4 produces these;
/// only the orchestrator (C9) and optional UI observers consume them.
#[derive(Debug, Clone)]
pub enum AudioEvent {
    /// Monitor → Capture transition. `preroll_samples` is a snapshot of the
    /// ring buffer (C1) taken at the moment of the transition.
    ///
    /// Per Open Question #1 (see DESIGN.md), the pre-roll is carried only
    /// here, not concatenated into the following `UtteranceReady`: this
    /// matches the literal source behavior the spec calls out, and keeps
    /// `UtteranceReady.samples` a plain post-trigger recording. Callers
    /// that want one contiguous stream concatenate `preroll_samples` with
    /// the `samples` of the `UtteranceReady` that follows.
    WakeTriggered {
        trigger: WakeTrigger,
        preroll_samples: Vec<i16>,
    },
    /// Capture → Monitor transition with a complete utterance.
    UtteranceReady {
        samples: Vec<i16>,
        sample_rate: u32,
        duration_s: f32,
    },
    /// A non-fatal device or detector error. The pipeline stays stopped
    /// until the caller restarts it.
    Error { cause: String },
}

/// A single stage's recorded wall-clock duration, for `PipelineResult::per_stage_ms`.
pub type StageDurations = Vec<(String, u64)>;

/// Outcome of one end-to-end `process_audio_event` run (§4.9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_calls_made: u32,
    pub duration_ms: u64,
    /// Per-stage timings in the order the stages ran: `stt`, `llm` (one
    /// entry per round-trip), `tool_<name>`, `tts`.
    pub per_stage_ms: Vec<(String, u64)>,
}

impl PipelineResult {
    /// Build a failed result with just a reason, no stage timings attached.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Display-only assistant status (§3 "AssistantStatus"). `Error` and
/// `Stopped` are absorbing until an explicit recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantStatus {
    Initializing,
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
    Stopped,
}

impl AssistantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for AssistantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stopwatch for a single pipeline run, accumulating named stage
/// durations as `process_audio_event` progresses through STT/LLM/tool/TTS.
#[derive(Debug, Default)]
pub struct RequestTimer {
    start: Option<Instant>,
    stages: StageDurations,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            start: Some(Instant::now()),
            stages: Vec::new(),
        }
    }

    /// Record a named stage's duration.
    pub fn record(&mut self, stage: impl Into<String>, elapsed: Duration) {
        self.stages.push((stage.into(), elapsed.as_millis() as u64));
    }

    /// Total elapsed time since `start()`, in milliseconds.
    pub fn total_ms(&self) -> u64 {
        self.start
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn into_stage_durations(self) -> StageDurations {
        self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_status_round_trips_through_as_str() {
        for status in [
            AssistantStatus::Initializing,
            AssistantStatus::Idle,
            AssistantStatus::Listening,
            AssistantStatus::Processing,
            AssistantStatus::Speaking,
            AssistantStatus::Error,
            AssistantStatus::Stopped,
        ] {
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn pipeline_result_failure_has_no_response() {
        let result = PipelineResult::failure("No speech detected");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No speech detected"));
        assert!(result.response.is_none());
    }

    #[test]
    fn request_timer_records_named_stages_in_order() {
        let mut timer = RequestTimer::start();
        timer.record("stt", Duration::from_millis(10));
        timer.record("llm", Duration::from_millis(20));
        let stages = timer.into_stage_durations();
        assert_eq!(stages[0].0, "stt");
        assert_eq!(stages[1].0, "llm");
    }
}
