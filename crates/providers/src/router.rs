//! Provider router — selects the correct LLM provider based on config.
//!
//! The router is itself a [`Provider`]: requests whose model carries a
//! `provider/` prefix naming a registered provider go there with the prefix
//! stripped; everything else goes to the default provider. A model that is
//! just a provider name (`"groq"` or `"groq/"`) means that provider's
//! configured default model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse};
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_models: HashMap<String, String>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_models: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Model used when a request names only the provider.
    pub fn set_default_model(&mut self, name: impl Into<String>, model: impl Into<String>) {
        self.default_models.insert(name.into(), model.into());
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a model string like "groq/llama-3.1-70b" to a provider and
    /// the model name that provider expects.
    pub fn resolve(&self, model: &str) -> Option<(Arc<dyn Provider>, String)> {
        let (prefix, rest) = model.split_once('/').unwrap_or((model, ""));
        if let Some(provider) = self.providers.get(prefix) {
            if !rest.is_empty() {
                return Some((provider.clone(), rest.to_string()));
            }
            if let Some(default_model) = self.default_models.get(prefix) {
                return Some((provider.clone(), default_model.clone()));
            }
        }

        self.default_provider().map(|p| (p, model.to_string()))
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Provider for ProviderRouter {
    fn name(&self) -> &str {
        &self.default_provider
    }

    async fn complete(
        &self,
        mut request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let (provider, model) = self.resolve(&request.model).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no provider registered for model '{}'",
                request.model
            ))
        })?;

        debug!(provider = %provider.name(), model = %model, "Routing completion");
        request.model = model;
        provider.complete(request).await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        match self.default_provider() {
            Some(provider) => provider.health_check().await,
            None => Ok(false),
        }
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &parley_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key)),
        );
        if let Some(model) = &provider_config.default_model {
            router.set_default_model(name.clone(), model.clone());
        }
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);
        router.register(
            config.default_provider.clone(),
            Arc::new(OpenAiCompatProvider::new(
                &config.default_provider,
                &base_url,
                &api_key,
            )),
        );
    }

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
