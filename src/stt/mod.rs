//! Speech-to-text (C5): a synchronous wave-file-in, text-out adapter backed
//! by an external recogniser process, with a content-addressed cache so
//! repeat audio never re-invokes the subprocess.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::SttConfig;
use crate::error::{CoreError, Result};

/// Hard timeout on the external recogniser subprocess (§5).
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Normalised audio handed to the STT adapter: mono, 16-bit, at `sample_rate`.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub language: String,
}

/// Result of one transcription, cacheable verbatim as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub confidence: f32,
    pub duration_ms: u64,
    pub model_id: String,
    #[serde(default)]
    pub cache_hit: bool,
}

/// Contract every STT backend satisfies (§4.5).
#[async_trait]
pub trait SttAdapter: Send + Sync {
    async fn transcribe(&self, input: AudioInput) -> Result<TranscriptionResult>;
}

/// Invokes an external recogniser binary on a scratch WAV file, with a
/// SHA-256 content-addressed JSON cache in front of it.
pub struct ExternalSttAdapter {
    binary_path: PathBuf,
    model_id: String,
    default_language: String,
    threads: usize,
    cache_dir: Option<PathBuf>,
}

impl ExternalSttAdapter {
    pub fn new(config: &SttConfig, state_dir: &Path) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            model_id: config.model_id.clone(),
            default_language: config.language.clone(),
            threads: config.threads,
            cache_dir: config.enable_cache.then(|| state_dir.join("stt_cache")),
        }
    }

    fn cache_key(&self, input: &AudioInput) -> String {
        let mut hasher = Sha256::new();
        for sample in &input.samples {
            hasher.update(sample.to_le_bytes());
        }
        hasher.update(input.sample_rate.to_le_bytes());
        hasher.update(input.language.as_bytes());
        hasher.update(self.model_id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }

    fn load_cached(&self, key: &str) -> Option<TranscriptionResult> {
        let path = self.cache_path(key)?;
        let text = std::fs::read_to_string(&path).ok()?;
        let mut result: TranscriptionResult = serde_json::from_str(&text).ok()?;
        result.cache_hit = true;
        Some(result)
    }

    fn store_cached(&self, key: &str, result: &TranscriptionResult) {
        let Some(path) = self.cache_path(key) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("failed to create STT cache dir: {e}");
                return;
            }
        }
        match serde_json::to_string(result) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    warn!("failed to write STT cache entry: {e}");
                }
            }
            Err(e) => warn!("failed to serialise STT cache entry: {e}"),
        }
    }

    /// Write a canonical mono 16-bit PCM WAV scratch file for the recogniser.
    fn write_scratch_wav(input: &AudioInput) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("voxcore-stt-{}.wav", uuid::Uuid::new_v4()));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: input.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| CoreError::Stt(format!("failed to create scratch WAV: {e}")))?;
        for &sample in &input.samples {
            writer
                .write_sample(sample)
                .map_err(|e| CoreError::Stt(format!("failed to write scratch WAV: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| CoreError::Stt(format!("failed to finalize scratch WAV: {e}")))?;
        Ok(path)
    }

    async fn invoke_recogniser(&self, wav_path: &Path, language: &str) -> Result<String> {
        let mut command = tokio::process::Command::new(&self.binary_path);
        command
            .arg(wav_path)
            .arg("--language")
            .arg(language)
            .arg("--model")
            .arg(&self.model_id)
            .arg("--threads")
            .arg(self.threads.to_string());

        let output = tokio::time::timeout(TRANSCRIBE_TIMEOUT, command.output())
            .await
            .map_err(|_| CoreError::Stt("recogniser timed out after 30s".into()))?
            .map_err(|e| CoreError::Stt(format!("failed to launch recogniser: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Stt(format!(
                "recogniser exited with {}: {stderr}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SttAdapter for ExternalSttAdapter {
    async fn transcribe(&self, input: AudioInput) -> Result<TranscriptionResult> {
        let started = std::time::Instant::now();
        let language = if input.language.is_empty() {
            self.default_language.clone()
        } else {
            input.language.clone()
        };

        if input.samples.is_empty() {
            return Ok(TranscriptionResult {
                text: String::new(),
                language,
                confidence: 0.0,
                duration_ms: 0,
                model_id: self.model_id.clone(),
                cache_hit: false,
            });
        }

        let cache_key = self.cache_key(&input);
        if let Some(cached) = self.load_cached(&cache_key) {
            info!("STT cache hit");
            return Ok(cached);
        }

        let wav_path = Self::write_scratch_wav(&input)?;
        let raw_output = self.invoke_recogniser(&wav_path, &language).await;
        let _ = std::fs::remove_file(&wav_path);
        let raw_output = raw_output?;

        let text = clean_transcript(&raw_output);
        let confidence = if text.is_empty() { 0.0 } else { 0.95 };

        let result = TranscriptionResult {
            text,
            language,
            confidence,
            duration_ms: started.elapsed().as_millis() as u64,
            model_id: self.model_id.clone(),
            cache_hit: false,
        };

        self.store_cached(&cache_key, &result);
        Ok(result)
    }
}

/// Strip lines that are obviously not transcript text: blank lines,
/// bracketed timestamps (`[00:00:01.200]`), and common log prefixes.
fn clean_transcript(raw: &str) -> String {
    let kept: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_bracketed_timestamp(line))
        .filter(|line| !is_log_prefix(line))
        .collect();
    kept.join(" ").trim().to_string()
}

fn is_bracketed_timestamp(line: &str) -> bool {
    line.starts_with('[')
        && line.ends_with(']')
        && line.chars().any(|c| c == ':')
        && line.chars().all(|c| c.is_ascii_digit() || ":.[] ".contains(c))
}

fn is_log_prefix(line: &str) -> bool {
    const PREFIXES: &[&str] = &["INFO:", "WARN:", "WARNING:", "ERROR:", "DEBUG:", "TRACE:"];
    PREFIXES.iter().any(|p| line.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_transcript_strips_metadata_lines() {
        let raw = "[00:00:00.000]\nINFO: loading model\n\nhello there\nWARN: low confidence\n";
        assert_eq!(clean_transcript(raw), "hello there");
    }

    #[test]
    fn clean_transcript_joins_multiple_text_lines() {
        let raw = "hello\nthere friend\n";
        assert_eq!(clean_transcript(raw), "hello there friend");
    }

    #[test]
    fn clean_transcript_of_pure_metadata_is_empty() {
        let raw = "[00:00:00.000]\nINFO: nothing heard\n";
        assert_eq!(clean_transcript(raw), "");
    }

    fn test_adapter() -> ExternalSttAdapter {
        let config = SttConfig::default();
        let dir = std::env::temp_dir().join(format!("voxcore-test-{}", uuid::Uuid::new_v4()));
        ExternalSttAdapter::new(&config, &dir)
    }

    #[test]
    fn cache_key_is_stable_for_identical_input() {
        let adapter = test_adapter();
        let input_a = AudioInput {
            samples: vec![1, 2, 3, 4],
            sample_rate: 16_000,
            language: "en".into(),
        };
        let input_b = input_a.clone();
        assert_eq!(adapter.cache_key(&input_a), adapter.cache_key(&input_b));
    }

    #[test]
    fn cache_key_differs_for_different_samples() {
        let adapter = test_adapter();
        let input_a = AudioInput {
            samples: vec![1, 2, 3, 4],
            sample_rate: 16_000,
            language: "en".into(),
        };
        let mut input_b = input_a.clone();
        input_b.samples[0] = 99;
        assert_ne!(adapter.cache_key(&input_a), adapter.cache_key(&input_b));
    }

    #[tokio::test]
    async fn empty_samples_return_zero_confidence_without_invoking_recogniser() {
        let adapter = test_adapter();
        let result = adapter
            .transcribe(AudioInput {
                samples: vec![],
                sample_rate: 16_000,
                language: "en".into(),
            })
            .await
            .unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.cache_hit);
    }
}
