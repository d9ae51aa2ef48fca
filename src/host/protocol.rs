//! Control Protocol wire types (C14): the inbound command set and the
//! outbound event/status/response shapes described in §6.1. Parsing lives
//! here; dispatch and I/O live in [`super::stdio`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::SessionInfo;
use crate::inline::{FormatKind, InlineResult, RewriteTone};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::messages::AssistantStatus;

/// One parsed inbound command, keyed by the `command` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Start,
    Stop,
    Interrupt,
    ClearConversation,
    GetStatus,
    GetMetrics,
    RewriteText {
        text: String,
        tone: String,
    },
    SummarizeText {
        text: String,
        #[serde(default)]
        max_sentences: Option<usize>,
    },
    ProofreadText {
        text: String,
        #[serde(default)]
        show_changes: Option<bool>,
    },
    FormatText {
        text: String,
        format: String,
    },
    ComposeText {
        prompt: String,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(default)]
        temperature: Option<f64>,
    },
}

/// Parse one inbound JSON line. Per P10, the caller logs and drops a
/// malformed line rather than failing the command loop.
pub fn parse_command(line: &str) -> Result<Command, serde_json::Error> {
    serde_json::from_str(line)
}

pub fn parse_rewrite_tone(tone: &str) -> RewriteTone {
    match tone {
        "friendly" => RewriteTone::Friendly,
        "concise" => RewriteTone::Concise,
        _ => RewriteTone::Professional,
    }
}

pub fn parse_format_kind(format: &str) -> FormatKind {
    match format {
        "key_points" => FormatKind::KeyPoints,
        "list" => FormatKind::List,
        "table" => FormatKind::Table,
        _ => FormatKind::Summary,
    }
}

/// An `EVENT: ` prefixed outbound line (§6.1).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    WakeWordDetected,
    ProcessingComplete {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcription: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_ms: u64,
    },
}

/// A `STATUS: ` prefixed outbound line (§6.1).
#[derive(Debug, Clone, Serialize)]
pub struct StatusBroadcast {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub status: AssistantStatus,
    pub timestamp: String,
}

impl StatusBroadcast {
    pub fn new(status: AssistantStatus) -> Self {
        Self {
            kind: "status_update",
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Build the plain-JSON `response:"status"` envelope.
pub fn status_response(status: AssistantStatus, conversation: &SessionInfo) -> Value {
    serde_json::json!({
        "response": "status",
        "status": status,
        "conversation": conversation,
    })
}

/// Build the plain-JSON `response:"metrics"` envelope.
pub fn metrics_response(snapshot: &MetricsSnapshot) -> Value {
    serde_json::json!({
        "response": "metrics",
        "metrics": snapshot,
    })
}

/// Build the `rewrite_complete` / `inline_ai_error` envelope.
pub fn rewrite_response(result: &InlineResult, tone: &str) -> Value {
    inline_envelope(result, "rewrite_complete", |v| {
        v["original"] = result.input.clone().into();
        v["rewritten"] = result.output.clone().into();
        v["tone"] = tone.into();
    })
}

pub fn summarize_response(result: &InlineResult) -> Value {
    inline_envelope(result, "summarize_complete", |v| {
        v["original"] = result.input.clone().into();
        v["summary"] = result.output.clone().into();
    })
}

pub fn proofread_response(result: &InlineResult) -> Value {
    inline_envelope(result, "proofread_complete", |v| {
        v["original"] = result.input.clone().into();
        v["corrected"] = result.output.clone().into();
        let changes: Value = result
            .metadata
            .get("changes")
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| serde_json::json!([]));
        v["changes"] = changes;
    })
}

pub fn format_response(result: &InlineResult, format: &str) -> Value {
    inline_envelope(result, "format_complete", |v| {
        v["original"] = result.input.clone().into();
        v["formatted"] = result.output.clone().into();
        v["format"] = format.into();
    })
}

pub fn compose_response(result: &InlineResult) -> Value {
    inline_envelope(result, "compose_complete", |v| {
        v["prompt"] = result.input.clone().into();
        v["composed"] = result.output.clone().into();
    })
}

fn inline_envelope(result: &InlineResult, ok_type: &str, fill: impl FnOnce(&mut Value)) -> Value {
    if !result.success {
        return serde_json::json!({
            "type": "inline_ai_error",
            "error": result.error.clone().unwrap_or_else(|| "inline operation failed".into()),
        });
    }
    let mut v = serde_json::json!({
        "type": ok_type,
        "tokens_used": result.tokens_used,
        "processing_ms": result.processing_ms,
    });
    fill(&mut v);
    v
}
