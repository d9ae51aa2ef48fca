//! Message types for LLM conversations.
//!
//! Provides the [`Message`] and [`Role`] types used to represent
//! conversation history sent to LLM providers and held by the
//! conversation store.
//!
//! # Examples
//!
//! ```
//! use voxcore::llm::message::{Message, Role};
//!
//! let user_msg = Message::user("What is Rust?");
//! assert_eq!(user_msg.role, Role::User);
//!
//! let tool_result = Message::tool("call_123", "file contents here", "call_123");
//! assert_eq!(tool_result.role, Role::Tool);
//! ```

use serde::{Deserialize, Serialize};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) output.
    Assistant,
    /// Tool execution result.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// An assistant tool call included in an assistant message.
///
/// When the assistant decides to invoke a tool, the message carries one or
/// more of these alongside (or instead of) text content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantToolCall {
    /// Unique identifier for this tool call.
    pub call_id: String,
    /// The function name being called.
    pub function_name: String,
    /// JSON-encoded arguments string.
    pub arguments: String,
}

/// A message in an LLM conversation.
///
/// Flat shape per the conversation store's data model: `{role, content,
/// name?, tool_call_id?}`, plus `tool_calls` for assistant messages that
/// requested tool invocations. Messages are treated as immutable once
/// appended to a [`crate::conversation::ConversationStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// Optional name qualifying the sender (tool name for `Role::Tool`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// For `Role::Tool` messages, the call ID this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls requested by an assistant message (empty otherwise).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<AssistantToolCall>,
}

impl Message {
    /// Create a message with the given role and plain text content.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Create an assistant message with plain text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Create an assistant message with tool calls and optional text.
    pub fn assistant_with_tool_calls(
        content: Option<String>,
        tool_calls: Vec<AssistantToolCall>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.unwrap_or_default(),
            name: None,
            tool_call_id: None,
            tool_calls,
        }
    }

    /// Create a tool result message answering the given call ID.
    pub fn tool(
        name: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Cheap token estimate for this message: 4 characters ≈ 1 token.
    ///
    /// This is the contract the conversation store's token cap (I5) is
    /// built on; any replacement must preserve the same inequality
    /// direction.
    pub fn estimated_tokens(&self) -> usize {
        self.content.chars().count() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn role_serde_round_trip() {
        for role in &[Role::System, Role::User, Role::Assistant, Role::Tool] {
            let json = serde_json::to_string(role).unwrap_or_default();
            let parsed: Result<Role, _> = serde_json::from_str(&json);
            assert_eq!(parsed.ok(), Some(*role));
        }
    }

    #[test]
    fn message_user_has_no_name_or_tool_call_id() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert!(msg.name.is_none());
        assert!(msg.tool_call_id.is_none());
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn message_assistant_with_tool_calls() {
        let tool_calls = vec![AssistantToolCall {
            call_id: "c1".into(),
            function_name: "execute_applescript".into(),
            arguments: r#"{"script":"..."}"#.into(),
        }];
        let msg = Message::assistant_with_tool_calls(Some("on it".into()), tool_calls);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].function_name, "execute_applescript");
    }

    #[test]
    fn message_tool_carries_call_id_and_name() {
        let msg = Message::tool("execute_applescript", "Success", "c1");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.content, "Success");
        assert_eq!(msg.name.as_deref(), Some("execute_applescript"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn message_serde_round_trip_omits_absent_optionals() {
        let msg = Message::user("hi");
        let json = serde_json::to_string(&msg).unwrap_or_default();
        assert!(!json.contains("name"));
        assert!(!json.contains("tool_call_id"));
        let parsed: Message = serde_json::from_str(&json).unwrap_or_else(|_| Message::user(""));
        assert_eq!(parsed, msg);
    }

    #[test]
    fn estimated_tokens_uses_four_chars_per_token() {
        let msg = Message::user("a".repeat(40));
        assert_eq!(msg.estimated_tokens(), 10);
    }
}
