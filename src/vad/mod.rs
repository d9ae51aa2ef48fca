//! Voice activity detection.
//!
//! Fallback implementation: RMS-energy thresholding on float-normalised
//! samples. Silero ONNX model integration is a natural drop-in replacement
//! behind the same contract.

use crate::config::AudioConfig;

/// Default RMS threshold used when no model-backed detector is configured.
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.02;

/// Contract every VAD backend satisfies.
pub trait VadAdapter: Send {
    /// Classify a single frame as speech or not, with a confidence in `[0,1]`.
    fn is_speech(&self, frame: &[i16]) -> (bool, f32);

    /// Stateful utterance-end detector.
    ///
    /// Transitions to `speaking=true` on the first speech frame. While
    /// speaking, a contiguous silence run of at least `min_silence_ms`
    /// ends the utterance: returns `true` exactly once, then resets.
    fn has_utterance_ended(&mut self, frame: &[i16], min_silence_ms: u32) -> bool;

    /// Reset all internal state (used on entry to a new Capture episode).
    fn reset(&mut self);
}

/// RMS-energy threshold VAD, the fallback implementation for C3.
pub struct EnergyVad {
    sample_rate: u32,
    threshold: f32,
    speaking: bool,
    silence_samples: usize,
}

impl EnergyVad {
    /// Create a detector from the audio config's `vad_threshold` and sample rate.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            threshold: if config.vad_threshold > 0.0 {
                config.vad_threshold
            } else {
                DEFAULT_ENERGY_THRESHOLD
            },
            speaking: false,
            silence_samples: 0,
        }
    }
}

impl VadAdapter for EnergyVad {
    fn is_speech(&self, frame: &[i16]) -> (bool, f32) {
        let rms = rms_energy(frame);
        let is_speech = rms > self.threshold;
        // Confidence: how far past threshold, saturating at 1.0.
        let confidence = if self.threshold <= 0.0 {
            if is_speech { 1.0 } else { 0.0 }
        } else {
            (rms / (self.threshold * 2.0)).clamp(0.0, 1.0)
        };
        (is_speech, confidence)
    }

    fn has_utterance_ended(&mut self, frame: &[i16], min_silence_ms: u32) -> bool {
        let (is_speech, _) = self.is_speech(frame);
        let silence_threshold_samples =
            (min_silence_ms as usize * self.sample_rate as usize) / 1000;

        if is_speech {
            self.speaking = true;
            self.silence_samples = 0;
            return false;
        }

        if !self.speaking {
            return false;
        }

        self.silence_samples = self.silence_samples.saturating_add(frame.len());
        if self.silence_samples >= silence_threshold_samples {
            self.speaking = false;
            self.silence_samples = 0;
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.speaking = false;
        self.silence_samples = 0;
    }
}

/// RMS energy of normalised int16 samples, in `[0,1]`.
fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let n = s as f64 / 32768.0;
            n * n
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}
