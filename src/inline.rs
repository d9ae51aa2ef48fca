//! Inline Transform Services (C13): five synchronous text operations built
//! directly on C6's provider adapter (§4.13). Pure functions over a
//! `ProviderAdapter`; no session state, no conversation store involvement,
//! no tool calling.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::InlineAiConfig;
use crate::llm::message::{Message, Role};
use crate::llm::provider::ProviderAdapter;
use crate::llm::types::RequestOptions;

const MAX_INPUT_CHARS: usize = 5000;
const MAX_COMPOSE_PROMPT_CHARS: usize = 1000;
const MAX_COMPOSE_CONTEXT_CHARS: usize = 2000;

/// Tone for [`InlineTransforms::rewrite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteTone {
    Professional,
    Friendly,
    Concise,
}

impl RewriteTone {
    fn instruction(self) -> &'static str {
        match self {
            Self::Professional => {
                "Rewrite the following text in a professional tone. Preserve its meaning. \
                 Return only the rewritten text, with no commentary."
            }
            Self::Friendly => {
                "Rewrite the following text in a warm, friendly tone. Preserve its meaning. \
                 Return only the rewritten text, with no commentary."
            }
            Self::Concise => {
                "Rewrite the following text to be as concise as possible while preserving its \
                 meaning. Return only the rewritten text, with no commentary."
            }
        }
    }
}

/// Output shape for [`InlineTransforms::format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Summary,
    KeyPoints,
    List,
    Table,
}

/// One correction in a structured proofread result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofreadChange {
    #[serde(rename = "type")]
    pub change_type: String,
    pub original: String,
    pub corrected: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ProofreadJson {
    corrected: String,
    #[serde(default)]
    changes: Vec<ProofreadChange>,
}

/// Result of any inline operation (§4.13's common shape).
#[derive(Debug, Clone)]
pub struct InlineResult {
    pub input: String,
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
    pub tokens_used: u32,
    pub processing_ms: u64,
    pub metadata: HashMap<String, String>,
}

impl InlineResult {
    fn failure(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            output: String::new(),
            success: false,
            error: Some(reason.into()),
            tokens_used: 0,
            processing_ms: 0,
            metadata: HashMap::new(),
        }
    }
}

/// Stateless facade over a provider adapter for the five inline operations.
pub struct InlineTransforms<'a> {
    provider: &'a dyn ProviderAdapter,
    config: &'a InlineAiConfig,
}

impl<'a> InlineTransforms<'a> {
    pub fn new(provider: &'a dyn ProviderAdapter, config: &'a InlineAiConfig) -> Self {
        Self { provider, config }
    }

    pub async fn rewrite(&self, text: &str, tone: RewriteTone) -> InlineResult {
        if let Err(reason) = validate_length(text, MAX_INPUT_CHARS, "rewrite") {
            return InlineResult::failure(text, reason);
        }
        let prompt = format!("{}\n\n{text}", tone.instruction());
        self.run(text, &prompt, 0.7, HashMap::from([("operation".to_string(), "rewrite".to_string())]))
            .await
    }

    /// `show_changes` selects the structured-JSON contract (Open Question
    /// #2); a malformed response falls back to treating the raw output as
    /// the corrected text with an empty change list.
    pub async fn proofread(&self, text: &str, show_changes: bool) -> InlineResult {
        if let Err(reason) = validate_length(text, MAX_INPUT_CHARS, "proofread") {
            return InlineResult::failure(text, reason);
        }

        if !show_changes {
            let prompt = format!(
                "Proofread the following text for spelling, grammar, and punctuation errors. \
                 Return only the corrected text, with no commentary.\n\n{text}"
            );
            let mut result = self
                .run(text, &prompt, 0.3, HashMap::from([("operation".to_string(), "proofread".to_string())]))
                .await;
            result.metadata.insert("mode".into(), "simple".into());
            return result;
        }

        let prompt = format!(
            "Proofread the following text for spelling, grammar, and punctuation errors. \
             Respond with ONLY a JSON object of the form {{\"corrected\": \"...\", \"changes\": \
             [{{\"type\": \"spelling|grammar|punctuation\", \"original\": \"...\", \"corrected\": \
             \"...\"}}]}}. If there are no errors, set `corrected` to the original text and \
             `changes` to an empty array.\n\n{text}"
        );
        let mut result = self
            .run(text, &prompt, 0.3, HashMap::from([("operation".to_string(), "proofread".to_string())]))
            .await;
        if !result.success {
            return result;
        }

        match parse_proofread_json(&result.output) {
            Some(parsed) => {
                result.output = parsed.corrected;
                result.metadata.insert("mode".into(), "json".into());
                result.metadata.insert(
                    "changes".into(),
                    serde_json::to_string(&parsed.changes).unwrap_or_else(|_| "[]".into()),
                );
            }
            None => {
                result.metadata.insert("mode".into(), "simple".into());
                result.metadata.insert("changes".into(), "[]".into());
            }
        }
        result
    }

    pub async fn summarize(&self, text: &str, max_sentences: usize) -> InlineResult {
        if let Err(reason) = validate_length(text, MAX_INPUT_CHARS, "summarize") {
            return InlineResult::failure(text, reason);
        }
        let max_sentences = max_sentences.max(1);
        let prompt = format!(
            "Summarize the following text in at most {max_sentences} sentence(s). Return only \
             the summary, with no commentary.\n\n{text}"
        );
        self.run(
            text,
            &prompt,
            0.5,
            HashMap::from([
                ("operation".to_string(), "summarize".to_string()),
                ("max_sentences".to_string(), max_sentences.to_string()),
            ]),
        )
        .await
    }

    pub async fn format(&self, text: &str, kind: FormatKind) -> InlineResult {
        if let Err(reason) = validate_length(text, MAX_INPUT_CHARS, "format") {
            return InlineResult::failure(text, reason);
        }
        let (prompt, kind_label) = match kind {
            FormatKind::Summary => (
                format!(
                    "Summarize the following text in {} sentence(s). Return only the summary, \
                     with no commentary.\n\n{text}",
                    self.config.formatting.summary_length
                ),
                "summary",
            ),
            FormatKind::KeyPoints => (
                format!(
                    "Extract the {} most important key points from the following text, one per \
                     line, each starting with \"- \". Return only the list, with no \
                     commentary.\n\n{text}",
                    self.config.formatting.key_points_count
                ),
                "key_points",
            ),
            FormatKind::List => (
                format!(
                    "Reformat the following text as a bulleted list, one item per line, each \
                     starting with \"- \". Return only the list, with no commentary.\n\n{text}"
                ),
                "list",
            ),
            FormatKind::Table => (
                format!(
                    "Reformat the following text as a Markdown table. Return only the table, \
                     with no commentary.\n\n{text}"
                ),
                "table",
            ),
        };
        let mut result = self
            .run(text, &prompt, 0.5, HashMap::from([("operation".to_string(), "format".to_string())]))
            .await;
        result.metadata.insert("kind".into(), kind_label.into());
        result
    }

    /// `max_length` and `temperature` fall back to `inline_ai.compose`'s
    /// configured default and 0.7 respectively when the caller doesn't
    /// specify one. `prompt` and `context` are truncated, not rejected, when
    /// over their length bounds; an empty `prompt` still fails.
    pub async fn compose(
        &self,
        prompt: &str,
        context: Option<&str>,
        max_length: Option<usize>,
        temperature: Option<f64>,
    ) -> InlineResult {
        if prompt.trim().is_empty() {
            return InlineResult::failure(prompt, "compose: prompt is empty");
        }
        let prompt_text = truncate_chars(prompt, MAX_COMPOSE_PROMPT_CHARS);
        let context = context.map(|c| truncate_chars(c, MAX_COMPOSE_CONTEXT_CHARS));
        let max_length = max_length.unwrap_or(self.config.compose.max_length);
        let temperature = temperature.unwrap_or(0.7);

        let mut full_prompt = format!(
            "Write text satisfying the following request. Aim for at most {max_length} \
             characters. Return only the composed text, with no commentary."
        );
        if let Some(ctx) = &context {
            full_prompt.push_str(&format!("\n\nContext:\n{ctx}"));
        }
        full_prompt.push_str(&format!("\n\nRequest:\n{prompt_text}"));

        self.run(
            &prompt_text,
            &full_prompt,
            temperature,
            HashMap::from([("operation".to_string(), "compose".to_string())]),
        )
        .await
    }

    async fn run(
        &self,
        original_input: &str,
        prompt: &str,
        temperature: f64,
        mut metadata: HashMap<String, String>,
    ) -> InlineResult {
        let start = Instant::now();
        let options = RequestOptions::new()
            .with_max_tokens(self.config.max_tokens as usize)
            .with_temperature(temperature)
            .with_stream(false);
        let messages = vec![Message::text(Role::User, prompt.to_string())];

        match self.provider.complete(&messages, &options, &[]).await {
            Ok(completion) => {
                metadata.insert("model_id".into(), completion.model_id.clone());
                InlineResult {
                    input: original_input.to_string(),
                    output: completion.content.trim().to_string(),
                    success: true,
                    error: None,
                    tokens_used: completion.tokens_used,
                    processing_ms: start.elapsed().as_millis() as u64,
                    metadata,
                }
            }
            Err(e) => InlineResult {
                input: original_input.to_string(),
                output: String::new(),
                success: false,
                error: Some(e.to_string()),
                tokens_used: 0,
                processing_ms: start.elapsed().as_millis() as u64,
                metadata,
            },
        }
    }
}

fn validate_length(text: &str, max: usize, op: &str) -> std::result::Result<(), String> {
    if text.trim().is_empty() {
        return Err(format!("{op}: input is empty"));
    }
    if text.chars().count() > max {
        return Err(format!("{op}: input exceeds {max} characters"));
    }
    Ok(())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn parse_proofread_json(raw: &str) -> Option<ProofreadJson> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("```json").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix("```").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::LlmError;
    use crate::llm::events::{FinishReason, LlmEvent};
    use crate::llm::provider::{CompletionResult, LlmEventStream, ToolDefinition};
    use crate::llm::types::EndpointType;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed string, or fails once then succeeds, for exercising
    /// the error path without a real network call.
    struct StubProvider {
        response: String,
        fail_first: Mutex<bool>,
    }

    impl StubProvider {
        fn canned(response: impl Into<String>) -> Self {
            Self {
                response: response.into(),
                fail_first: Mutex::new(false),
            }
        }

        fn failing() -> Self {
            Self {
                response: String::new(),
                fail_first: Mutex::new(true),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn endpoint_type(&self) -> EndpointType {
            EndpointType::Custom
        }

        async fn send(
            &self,
            _messages: &[Message],
            _options: &RequestOptions,
            _tools: &[ToolDefinition],
        ) -> std::result::Result<LlmEventStream, LlmError> {
            unreachable!("tests call complete() directly via the default impl's send()");
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _options: &RequestOptions,
            _tools: &[ToolDefinition],
        ) -> std::result::Result<CompletionResult, LlmError> {
            if *self.fail_first.lock().unwrap_or_else(|e| e.into_inner()) {
                return Err(LlmError::ConnectionError("stub down".into()));
            }
            Ok(CompletionResult {
                content: self.response.clone(),
                model_id: "stub-model".into(),
                tokens_used: 42,
                finish_reason: FinishReason::Stop,
                tool_calls: Vec::new(),
                metadata: HashMap::new(),
            })
        }
    }

    fn config() -> InlineAiConfig {
        InlineAiConfig::default()
    }

    #[tokio::test]
    async fn rewrite_returns_provider_output_on_success() {
        let provider = StubProvider::canned("A more professional version.");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.rewrite("hey can u help me out", RewriteTone::Professional).await;
        assert!(result.success);
        assert_eq!(result.output, "A more professional version.");
        assert_eq!(result.tokens_used, 42);
        assert_eq!(result.metadata.get("operation").map(String::as_str), Some("rewrite"));
    }

    #[tokio::test]
    async fn rewrite_rejects_empty_input_without_calling_provider() {
        let provider = StubProvider::failing();
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.rewrite("   ", RewriteTone::Concise).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn rewrite_rejects_input_over_length_bound() {
        let provider = StubProvider::canned("unused");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let oversized = "a".repeat(MAX_INPUT_CHARS + 1);
        let result = transforms.rewrite(&oversized, RewriteTone::Friendly).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("exceeds"));
    }

    #[tokio::test]
    async fn rewrite_surfaces_provider_failure() {
        let provider = StubProvider::failing();
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.rewrite("hello there", RewriteTone::Concise).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn proofread_simple_mode_returns_raw_text() {
        let provider = StubProvider::canned("I have corrected this sentence.");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.proofread("I has correct this sentance.", false).await;
        assert!(result.success);
        assert_eq!(result.output, "I have corrected this sentence.");
        assert_eq!(result.metadata.get("mode").map(String::as_str), Some("simple"));
    }

    #[tokio::test]
    async fn proofread_json_mode_parses_structured_response() {
        let provider = StubProvider::canned(
            r#"{"corrected": "I have corrected this sentence.", "changes": [{"type": "grammar", "original": "has correct", "corrected": "have corrected"}]}"#,
        );
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.proofread("I has correct this sentance.", true).await;
        assert!(result.success);
        assert_eq!(result.output, "I have corrected this sentence.");
        assert_eq!(result.metadata.get("mode").map(String::as_str), Some("json"));
        assert!(result.metadata.get("changes").unwrap().contains("grammar"));
    }

    #[tokio::test]
    async fn proofread_json_mode_falls_back_to_simple_on_malformed_json() {
        let provider = StubProvider::canned("Sure! Here is the corrected text: all good.");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.proofread("all gud", true).await;
        assert!(result.success);
        assert_eq!(result.output, "Sure! Here is the corrected text: all good.");
        assert_eq!(result.metadata.get("mode").map(String::as_str), Some("simple"));
        assert_eq!(result.metadata.get("changes").map(String::as_str), Some("[]"));
    }

    #[tokio::test]
    async fn proofread_json_mode_strips_markdown_code_fence() {
        let provider = StubProvider::canned(
            "```json\n{\"corrected\": \"Fixed.\", \"changes\": []}\n```",
        );
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.proofread("Fxed.", true).await;
        assert!(result.success);
        assert_eq!(result.output, "Fixed.");
        assert_eq!(result.metadata.get("mode").map(String::as_str), Some("json"));
    }

    #[tokio::test]
    async fn summarize_clamps_max_sentences_to_at_least_one() {
        let provider = StubProvider::canned("One sentence summary.");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.summarize("Some long text here.", 0).await;
        assert!(result.success);
        assert_eq!(result.metadata.get("max_sentences").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn format_key_points_tags_the_output_kind() {
        let provider = StubProvider::canned("- point one\n- point two");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.format("Some article text.", FormatKind::KeyPoints).await;
        assert!(result.success);
        assert_eq!(result.metadata.get("kind").map(String::as_str), Some("key_points"));
    }

    #[tokio::test]
    async fn compose_rejects_empty_prompt() {
        let provider = StubProvider::canned("unused");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let result = transforms.compose("", None, None, None).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn compose_truncates_overlong_prompt_and_context_instead_of_rejecting() {
        let provider = StubProvider::canned("A composed reply.");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        let long_prompt = "p".repeat(MAX_COMPOSE_PROMPT_CHARS + 500);
        let long_context = "c".repeat(MAX_COMPOSE_CONTEXT_CHARS + 500);
        let result = transforms
            .compose(&long_prompt, Some(&long_context), None, None)
            .await;
        assert!(result.success);
        assert_eq!(result.input.chars().count(), MAX_COMPOSE_PROMPT_CHARS);
    }

    #[tokio::test]
    async fn compose_uses_caller_supplied_temperature_and_max_length() {
        let provider = StubProvider::canned("A composed reply.");
        let cfg = config();
        let transforms = InlineTransforms::new(&provider, &cfg);
        // Temperature and max_length aren't surfaced on the result directly,
        // but the call should still succeed with overrides supplied.
        let result = transforms.compose("write a haiku", None, Some(100), Some(0.9)).await;
        assert!(result.success);
        assert_eq!(result.output, "A composed reply.");
    }
}
