//! Tool Broker (C8): named tool invocation surface. The core never embeds
//! tool logic; it only defines the discovery/call-by-name contract and the
//! "absent" behavior C9 falls back to when no broker is configured.

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::provider::ToolDefinition;

/// Message substituted for the LLM when no tool broker is configured.
pub const TOOLS_UNAVAILABLE_MESSAGE: &str = "Error: Tool execution not available";

/// Contract every tool broker satisfies. The core ships no concrete
/// implementations; a host process registers one built from its own
/// platform-specific tool surface (file system, OS automation, etc.).
#[async_trait]
pub trait ToolBroker: Send + Sync {
    /// Tool definitions to advertise to the LLM provider.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Invoke `name` with `arguments`, returning its result as a string.
    ///
    /// Implementations should return an error-describing string rather
    /// than propagating an error when the failure is tool-specific (e.g.
    /// "file not found") so the LLM can see and adapt to it (§4.11); only
    /// broker-level failures (bad wiring, transport errors) should
    /// propagate as `Err`.
    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String>;
}

/// The absence of a broker, modeled explicitly rather than as `Option<dyn
/// ToolBroker>` so C9 can call through the same trait unconditionally.
pub struct NullToolBroker;

#[async_trait]
impl ToolBroker for NullToolBroker {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(Vec::new())
    }

    async fn call_tool(&self, _name: &str, _arguments: serde_json::Value) -> Result<String> {
        Ok(TOOLS_UNAVAILABLE_MESSAGE.to_string())
    }
}
