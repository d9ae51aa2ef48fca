//! Conversation Store (C7): an ordered message log with turn/token
//! pruning and idle-session reset. Owned exclusively by the orchestrator
//! (C9) during a request; never touched by C13.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ConversationConfig;
use crate::llm::message::{AssistantToolCall, Message, Role};

/// Snapshot of session bookkeeping, returned by `session_info()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub message_count: usize,
    pub turn_count: usize,
    pub session_duration_s: f64,
    pub idle_s: f64,
}

/// Ordered message log with pruning (I4, I5) and idle reset (I6).
pub struct ConversationStore {
    messages: Vec<Message>,
    metadata: HashMap<String, String>,
    system_prompt: Option<String>,
    session_start: Instant,
    last_interaction: Instant,
    max_turns: usize,
    max_context_tokens: usize,
    idle_timeout: Duration,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig) -> Self {
        let now = Instant::now();
        let messages = config
            .system_prompt
            .as_ref()
            .map(|sp| vec![Message::system(sp.clone())])
            .unwrap_or_default();

        Self {
            messages,
            metadata: HashMap::new(),
            system_prompt: config.system_prompt.clone(),
            session_start: now,
            last_interaction: now,
            max_turns: config.max_history_turns,
            max_context_tokens: config.context_window_tokens,
            idle_timeout: Duration::from_secs(config.session_timeout_minutes * 60),
        }
    }

    /// Append a user message. Pruning (I4, I5) runs afterward.
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.maybe_reset_if_idle();
        self.messages.push(Message::user(content));
        self.touch_and_prune();
    }

    /// Append an assistant message, optionally carrying tool calls.
    pub fn add_assistant(&mut self, content: impl Into<String>, tool_calls: Vec<AssistantToolCall>) {
        self.maybe_reset_if_idle();
        self.messages
            .push(Message::assistant_with_tool_calls(Some(content.into()), tool_calls));
        self.touch_and_prune();
    }

    /// Append a tool result message answering `tool_call_id`.
    pub fn add_tool(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) {
        self.maybe_reset_if_idle();
        self.messages.push(Message::tool(name, content, tool_call_id));
        self.touch_and_prune();
    }

    /// Append a complete user/assistant turn in one call.
    pub fn add_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.add_user(user);
        self.add_assistant(assistant, Vec::new());
    }

    /// The full message log, after an idle-timeout check (I6).
    pub fn messages(&mut self) -> &[Message] {
        self.maybe_reset_if_idle();
        &self.messages
    }

    /// The last `n` turns, where a turn starts at a user message and runs
    /// to (but not past) the following user message.
    pub fn recent_turns(&self, n: usize) -> Vec<Message> {
        if n == 0 {
            return Vec::new();
        }
        let mut seen_turns = 0;
        let mut start_idx = 0;
        for (i, message) in self.messages.iter().enumerate().rev() {
            if message.role == Role::User {
                seen_turns += 1;
                start_idx = i;
                if seen_turns == n {
                    break;
                }
            }
        }
        self.messages[start_idx..].to_vec()
    }

    /// Remove every message, including any leading system message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.metadata.clear();
        let now = Instant::now();
        self.session_start = now;
        self.last_interaction = now;
    }

    /// Reset the session while preserving the leading system message, the
    /// same behavior the idle timeout triggers automatically (I6).
    pub fn reset_session(&mut self) {
        self.messages = self
            .system_prompt
            .as_ref()
            .map(|sp| vec![Message::system(sp.clone())])
            .unwrap_or_default();
        let now = Instant::now();
        self.session_start = now;
        self.last_interaction = now;
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            message_count: self.messages.len(),
            turn_count: self.messages.iter().filter(|m| m.role == Role::User).count(),
            session_duration_s: self.session_start.elapsed().as_secs_f64(),
            idle_s: self.last_interaction.elapsed().as_secs_f64(),
        }
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    fn maybe_reset_if_idle(&mut self) {
        if self.idle_timeout > Duration::ZERO && self.last_interaction.elapsed() >= self.idle_timeout {
            self.reset_session();
        }
    }

    fn touch_and_prune(&mut self) {
        self.last_interaction = Instant::now();
        self.prune_by_turn_count();
        self.prune_by_token_count();
    }

    fn first_non_system_index(&self) -> Option<usize> {
        self.messages.iter().position(|m| m.role != Role::System)
    }

    /// I4: cap non-system message count at `2 * max_turns`.
    fn prune_by_turn_count(&mut self) {
        let cap = 2 * self.max_turns;
        loop {
            let non_system = self.messages.iter().filter(|m| m.role != Role::System).count();
            if non_system <= cap {
                break;
            }
            match self.first_non_system_index() {
                Some(idx) => {
                    self.messages.remove(idx);
                }
                None => break,
            }
        }
    }

    /// I5: cap estimated context tokens, dropping oldest non-system
    /// messages until the bound holds or only the system message remains.
    fn prune_by_token_count(&mut self) {
        loop {
            let total: usize = self.messages.iter().map(Message::estimated_tokens).sum();
            if total <= self.max_context_tokens {
                break;
            }
            match self.first_non_system_index() {
                Some(idx) => {
                    self.messages.remove(idx);
                }
                None => break,
            }
        }
    }
}
