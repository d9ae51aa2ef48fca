//! Text-to-speech (C10): enqueue an utterance, await completion, stay
//! interruptible. The concrete synthesis backend is an external process
//! (mirroring C5's subprocess pattern); playback goes through the same
//! `cpal` device abstraction as capture.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::audio::playback::CpalPlayback;
use crate::config::{AudioConfig, TtsEngineSettings};
use crate::error::{CoreError, Result};

/// Words-per-minute bounds for `set_rate` (§4.10).
pub const MIN_RATE_WPM: u32 = 90;
pub const MAX_RATE_WPM: u32 = 400;

/// Hard timeout on the external synthesis subprocess.
const SYNTHESIZE_TIMEOUT: Duration = Duration::from_secs(60);

fn clamp_rate(wpm: u32) -> u32 {
    wpm.clamp(MIN_RATE_WPM, MAX_RATE_WPM)
}

fn clamp_volume(volume: f32) -> f32 {
    volume.clamp(0.0, 1.0)
}

/// Contract every TTS backend satisfies.
#[async_trait]
pub trait TtsAdapter: Send + Sync {
    /// Synthesize and play `text`. If another utterance is in flight it is
    /// stopped first. When `wait` is true, resolves only after playback
    /// completes (or is stopped).
    async fn speak(&self, text: &str, wait: bool) -> Result<()>;

    /// Stop the current utterance immediately, if any.
    fn stop(&self);

    fn is_speaking(&self) -> bool;

    fn set_voice(&self, voice: &str);

    /// Clamped to `[MIN_RATE_WPM, MAX_RATE_WPM]`.
    fn set_rate(&self, wpm: u32);

    /// Clamped to `[0,1]`.
    fn set_volume(&self, volume: f32);

    async fn close(&self);
}

/// Tracks one in-flight utterance: a single explicit completion channel
/// instead of a polling bridge (Open Question #3).
struct Utterance {
    notify: Notify,
    stop_requested: AtomicBool,
    done: AtomicBool,
}

impl Utterance {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            done: AtomicBool::new(false),
        })
    }

    fn finish(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Synthesizes text via an external binary and plays the resulting WAV
/// through the configured output device.
pub struct ExternalTts {
    binary_path: PathBuf,
    sample_rate: u32,
    device_name: Option<String>,
    voice: Mutex<String>,
    rate_wpm: AtomicU32,
    volume_bits: AtomicU32,
    current: Mutex<Option<Arc<Utterance>>>,
}

impl ExternalTts {
    pub fn new(settings: &TtsEngineSettings, audio_config: &AudioConfig, binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            sample_rate: audio_config.sample_rate,
            device_name: audio_config.device_name.clone(),
            voice: Mutex::new(settings.voice.clone().unwrap_or_else(|| "default".into())),
            rate_wpm: AtomicU32::new(clamp_rate(settings.rate.unwrap_or(180))),
            volume_bits: AtomicU32::new(clamp_volume(settings.volume.unwrap_or(1.0)).to_bits()),
            current: Mutex::new(None),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Acquire))
    }

    /// Invoke the external synthesizer, producing raw f32 samples at `sample_rate`.
    async fn synthesize(&self, text: &str) -> Result<Vec<f32>> {
        let voice = self.voice.lock().await.clone();
        let rate = self.rate_wpm.load(Ordering::Acquire);
        let out_path = std::env::temp_dir().join(format!("voxcore-tts-{}.wav", uuid::Uuid::new_v4()));

        let mut command = tokio::process::Command::new(&self.binary_path);
        command
            .arg("--voice")
            .arg(&voice)
            .arg("--rate")
            .arg(rate.to_string())
            .arg("--output")
            .arg(&out_path)
            .arg(text);

        let output = tokio::time::timeout(SYNTHESIZE_TIMEOUT, command.output())
            .await
            .map_err(|_| CoreError::Tts("synthesizer timed out after 60s".into()))?
            .map_err(|e| CoreError::Tts(format!("failed to launch synthesizer: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Tts(format!(
                "synthesizer exited with {}: {stderr}",
                output.status
            )));
        }

        let reader = hound::WavReader::open(&out_path)
            .map_err(|e| CoreError::Tts(format!("failed to read synthesized WAV: {e}")))?;
        let samples: Vec<f32> = reader
            .into_samples::<i16>()
            .filter_map(std::result::Result::ok)
            .map(|s| s as f32 / i16::MAX as f32)
            .collect();
        let _ = std::fs::remove_file(&out_path);
        Ok(samples)
    }
}

#[async_trait]
impl TtsAdapter for ExternalTts {
    async fn speak(&self, text: &str, wait: bool) -> Result<()> {
        self.stop();

        let utterance = Utterance::new();
        {
            let mut guard = self.current.lock().await;
            *guard = Some(Arc::clone(&utterance));
        }

        let samples = match self.synthesize(text).await {
            Ok(samples) => samples,
            Err(e) => {
                utterance.finish();
                return Err(e);
            }
        };

        let volume = self.volume();
        let scaled: Vec<f32> = samples.iter().map(|s| s * volume).collect();
        let sample_rate = self.sample_rate;
        let device_name = self.device_name.clone();
        let utterance_for_playback = Arc::clone(&utterance);

        let playback_task = tokio::task::spawn_blocking(move || {
            if utterance_for_playback.stop_requested.load(Ordering::Acquire) {
                return;
            }
            let audio_config = AudioConfig {
                sample_rate,
                device_name,
                ..Default::default()
            };
            match CpalPlayback::new(&audio_config) {
                Ok(mut playback) => {
                    if let Err(e) = playback.play(&scaled, sample_rate) {
                        warn!("TTS playback failed: {e}");
                    }
                }
                Err(e) => warn!("TTS playback device unavailable: {e}"),
            }
        });

        let utterance_for_finish = Arc::clone(&utterance);
        tokio::spawn(async move {
            let _ = playback_task.await;
            utterance_for_finish.finish();
        });

        if wait {
            if !utterance.done.load(Ordering::Acquire) {
                utterance.notify.notified().await;
            }
        }
        Ok(())
    }

    fn stop(&self) {
        if let Ok(guard) = self.current.try_lock() {
            if let Some(utterance) = guard.as_ref() {
                utterance.stop_requested.store(true, Ordering::Release);
                utterance.finish();
            }
        }
    }

    fn is_speaking(&self) -> bool {
        self.current
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|u| !u.done.load(Ordering::Acquire)))
            .unwrap_or(false)
    }

    fn set_voice(&self, voice: &str) {
        let voice = voice.to_string();
        let cell = &self.voice;
        // `set_voice` is synchronous in the trait; the mutex is uncontended
        // outside of an in-flight `synthesize` call, so a blocking lock is fine.
        if let Ok(mut guard) = cell.try_lock() {
            *guard = voice;
        } else {
            warn!("set_voice called while synthesis in flight; ignoring");
        }
    }

    fn set_rate(&self, wpm: u32) {
        self.rate_wpm.store(clamp_rate(wpm), Ordering::Release);
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits
            .store(clamp_volume(volume).to_bits(), Ordering::Release);
    }

    async fn close(&self) {
        self.stop();
        info!("TTS adapter closed");
    }
}
