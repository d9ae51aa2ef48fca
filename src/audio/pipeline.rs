//! The Monitor/Capture state machine (C4): wires C1 (ring buffer), C2
//! (wake word), and C3 (VAD) together and turns a stream of raw audio
//! chunks into [`AudioEvent`]s for the orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::ring_buffer::RingBuffer;
use crate::config::AudioConfig;
use crate::pipeline::messages::{AudioChunk, AudioEvent, WakeTrigger};
use crate::vad::VadAdapter;
use crate::wakeword::WakeWordAdapter;

/// Convert f32 samples in `[-1.0, 1.0]` to the canonical i16 format (§3).
fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

enum Mode {
    Monitor,
    Capture {
        buffer: Vec<i16>,
        started: Instant,
    },
}

/// A cloneable handle for triggering capture from outside the pipeline's
/// owning task (e.g. from the control protocol's command dispatcher).
#[derive(Clone)]
pub struct AudioPipelineHandle {
    hotkey_triggered: Arc<AtomicBool>,
}

impl AudioPipelineHandle {
    /// Set the hotkey flag. Consumed on the next chunk processed in
    /// Monitor mode; takes priority over a simultaneous wake detection.
    pub fn trigger_hotkey(&self) {
        self.hotkey_triggered.store(true, Ordering::Release);
    }
}

/// Drives the Monitor/Capture state machine for one continuously-running
/// audio stream. Exclusively owns the ring buffer, the wake-word adapter,
/// and the VAD adapter (§3 "Ownership").
pub struct AudioPipeline {
    ring: Arc<RingBuffer>,
    wakeword: Box<dyn WakeWordAdapter>,
    vad: Box<dyn VadAdapter>,
    wake_enabled: bool,
    hotkey_enabled: bool,
    hotkey_triggered: Arc<AtomicBool>,
    sample_rate: u32,
    min_silence_ms: u32,
    max_utterance_s: f32,
}

impl AudioPipeline {
    /// Build a new pipeline. The ring buffer is sized from
    /// `config.preroll_s` at `config.sample_rate`.
    pub fn new(
        config: &AudioConfig,
        wakeword: Box<dyn WakeWordAdapter>,
        vad: Box<dyn VadAdapter>,
    ) -> Self {
        Self {
            ring: Arc::new(RingBuffer::with_duration(config.preroll_s, config.sample_rate)),
            wakeword,
            vad,
            wake_enabled: config.wake_word_enabled,
            hotkey_enabled: config.hotkey_enabled,
            hotkey_triggered: Arc::new(AtomicBool::new(false)),
            sample_rate: config.sample_rate,
            min_silence_ms: config.min_silence_ms,
            max_utterance_s: config.max_utterance_s,
        }
    }

    /// A cloneable handle that can trigger capture from another task.
    pub fn handle(&self) -> AudioPipelineHandle {
        AudioPipelineHandle {
            hotkey_triggered: Arc::clone(&self.hotkey_triggered),
        }
    }

    /// Convenience for tests and direct callers that don't need a handle.
    pub fn trigger_hotkey(&self) {
        self.hotkey_triggered.store(true, Ordering::Release);
    }

    /// Consume chunks from the capture thread (via `chunks`) until the
    /// channel closes, emitting [`AudioEvent`]s on `events`.
    ///
    /// Every chunk is written into the ring buffer before any detector
    /// runs on it (P2), regardless of mode.
    pub async fn run(mut self, mut chunks: mpsc::Receiver<AudioChunk>, events: mpsc::Sender<AudioEvent>) {
        let mut mode = Mode::Monitor;

        while let Some(chunk) = chunks.recv().await {
            let frame = to_i16(&chunk.samples);
            self.ring.write(&frame);

            match &mut mode {
                Mode::Monitor => {
                    if let Some(trigger) = self.detect_trigger(&frame) {
                        let preroll_samples = self.ring.read_all();
                        self.vad.reset();
                        info!(?trigger, "wake event, entering capture");
                        let _ = events
                            .send(AudioEvent::WakeTriggered {
                                trigger,
                                preroll_samples,
                            })
                            .await;
                        mode = Mode::Capture {
                            buffer: Vec::new(),
                            started: Instant::now(),
                        };
                    }
                }
                Mode::Capture { buffer, started } => {
                    buffer.extend_from_slice(&frame);
                    let ended = self.vad.has_utterance_ended(&frame, self.min_silence_ms);
                    let truncated = started.elapsed().as_secs_f32() >= self.max_utterance_s;

                    if ended || truncated {
                        if truncated && !ended {
                            warn!(
                                max_utterance_s = self.max_utterance_s,
                                "utterance exceeded max duration, truncating"
                            );
                        }
                        let samples = std::mem::take(buffer);
                        let duration_s = samples.len() as f32 / self.sample_rate as f32;
                        let _ = events
                            .send(AudioEvent::UtteranceReady {
                                samples,
                                sample_rate: self.sample_rate,
                                duration_s,
                            })
                            .await;
                        self.ring.clear();
                        mode = Mode::Monitor;
                    }
                }
            }
        }
    }

    /// Check for a hotkey or wake-word trigger on this frame. The hotkey
    /// flag is always consumed (reset) here, whether or not it ends up
    /// winning, so a stray flag never leaks into the next Capture episode.
    fn detect_trigger(&mut self, frame: &[i16]) -> Option<WakeTrigger> {
        let hotkey_fired = self.hotkey_triggered.swap(false, Ordering::AcqRel);
        if hotkey_fired && self.hotkey_enabled {
            return Some(WakeTrigger::Hotkey);
        }
        if self.wake_enabled && self.wakeword.process_frame(frame) {
            return Some(WakeTrigger::Wake);
        }
        None
    }
}
