//! LLM provider implementations.
//!
//! Each submodule implements [`ProviderAdapter`](super::provider::ProviderAdapter)
//! for a specific backend, normalizing its wire format to the shared
//! [`LlmEvent`](super::events::LlmEvent) model.
//!
//! - [`openai`] — OpenAI Chat Completions API
//! - [`anthropic`] — Anthropic Messages API
//! - [`local`] — local OpenAI-compatible endpoints (Ollama, llama.cpp, vLLM)
//! - [`fallback`] — wraps a primary provider with a fallback on retryable errors
//! - [`sse`] — shared Server-Sent Events parser

pub mod anthropic;
pub mod fallback;
pub mod local;
pub mod openai;
pub mod sse;
