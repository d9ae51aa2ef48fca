//! Provider factory: dispatches a `backend` tag to a registered constructor.
//!
//! Replaces a dynamic class registry with a closed set of constructor
//! functions indexed by tag, plus a small runtime-registration slot for
//! custom backends — no reflection, per the redesign notes for dynamic
//! provider selection.

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::error::LlmError;
use crate::llm::provider::ProviderAdapter;
use crate::llm::providers::anthropic::{AnthropicAdapter, AnthropicConfig};
use crate::llm::providers::local::{LocalAdapter, LocalConfig};
use crate::llm::providers::openai::{OpenAiAdapter, OpenAiConfig};

/// Per-backend configuration read from the `llm` config section.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct BackendSettings {
    /// Base URL, required for `local` and `custom` backends.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model identifier, required for every backend.
    #[serde(default)]
    pub model: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Default max tokens for requests against this backend.
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Default sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl BackendSettings {
    fn resolve_api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_ref()?;
        std::env::var(var).ok()
    }

    fn require_model(&self, backend: &str) -> Result<String, LlmError> {
        self.model
            .clone()
            .ok_or_else(|| LlmError::ConfigError(format!("{backend}: missing required field `model`")))
    }

    fn require_base_url(&self, backend: &str) -> Result<String, LlmError> {
        self.base_url
            .clone()
            .ok_or_else(|| LlmError::ConfigError(format!("{backend}: missing required field `base_url`")))
    }
}

type Constructor = Box<dyn Fn(&BackendSettings) -> Result<Arc<dyn ProviderAdapter>, LlmError> + Send + Sync>;

/// Builds provider adapters from a `backend` tag and its settings.
///
/// Ships with constructors for `openai`, `anthropic`, and `local`; callers
/// may [`register`](Self::register) additional tags for custom backends.
pub struct ProviderFactory {
    constructors: HashMap<String, Constructor>,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register("openai", |settings| {
            let model = settings.require_model("openai")?;
            let api_key = settings.resolve_api_key().ok_or_else(|| {
                LlmError::ConfigError("openai: no API key found in the configured env var".into())
            })?;
            let mut config = OpenAiConfig::new(api_key, model);
            if let Some(base_url) = &settings.base_url {
                config = config.with_base_url(base_url.clone());
            }
            Ok(Arc::new(OpenAiAdapter::new(config)) as Arc<dyn ProviderAdapter>)
        });
        factory.register("anthropic", |settings| {
            let model = settings.require_model("anthropic")?;
            let api_key = settings.resolve_api_key().ok_or_else(|| {
                LlmError::ConfigError("anthropic: no API key found in the configured env var".into())
            })?;
            let mut config = AnthropicConfig::new(api_key, model);
            if let Some(base_url) = &settings.base_url {
                config = config.with_base_url(base_url.clone());
            }
            Ok(Arc::new(AnthropicAdapter::new(config)) as Arc<dyn ProviderAdapter>)
        });
        factory.register("local", |settings| {
            let model = settings.require_model("local")?;
            let base_url = settings.require_base_url("local")?;
            let mut config = LocalConfig::new(base_url, model);
            if let Some(api_key) = settings.resolve_api_key() {
                config = config.with_api_key(api_key);
            }
            Ok(Arc::new(LocalAdapter::new(config)) as Arc<dyn ProviderAdapter>)
        });
        factory
    }
}

impl ProviderFactory {
    /// Create a factory with only the built-in `openai`/`anthropic`/`local`
    /// constructors registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a backend tag, overwriting any existing
    /// registration for that tag. Used both to add custom backends and to
    /// override a built-in one (e.g. in tests).
    pub fn register(
        &mut self,
        backend: impl Into<String>,
        constructor: impl Fn(&BackendSettings) -> Result<Arc<dyn ProviderAdapter>, LlmError>
        + Send
        + Sync
        + 'static,
    ) {
        self.constructors.insert(backend.into(), Box::new(constructor));
    }

    /// Build a provider adapter for the given backend tag.
    pub fn build(
        &self,
        backend: &str,
        settings: &BackendSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        let constructor = self.constructors.get(backend).ok_or_else(|| {
            LlmError::ConfigError(format!("unknown llm backend: {backend}"))
        })?;
        constructor(settings)
    }
}
