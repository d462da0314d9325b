//! Provider registry — builds and caches adapters per provider spec.
//!
//! Adapters are cheap but hold resolved API keys and share one pooled
//! HTTP client; caching by spec fingerprint keeps per-turn resolution
//! allocation-free.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use nexus_domain::error::{Error, Result};
use nexus_domain::project::ProviderSpec;

use crate::anthropic::AnthropicAdapter;
use crate::openai_compat::OpenAiCompatAdapter;
use crate::traits::ProviderAdapter;

pub struct ProviderRegistry {
    client: reqwest::Client,
    cache: RwLock<HashMap<String, Arc<dyn ProviderAdapter>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        // One pooled client shared across all adapters.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .unwrap_or_default();
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve (or build) an adapter for the given provider spec.
    pub fn resolve(&self, spec: &ProviderSpec) -> Result<Arc<dyn ProviderAdapter>> {
        let key = fingerprint(spec);
        if let Some(adapter) = self.cache.read().get(&key) {
            return Ok(adapter.clone());
        }

        let adapter: Arc<dyn ProviderAdapter> = match spec.provider.as_str() {
            "anthropic" => Arc::new(AnthropicAdapter::from_spec(spec, self.client.clone())?),
            "openai" => Arc::new(OpenAiCompatAdapter::from_spec(spec, self.client.clone())?),
            other => {
                return Err(Error::Validation(format!(
                    "unknown provider '{other}' (expected \"anthropic\" or \"openai\")"
                )))
            }
        };

        self.cache.write().insert(key, adapter.clone());
        Ok(adapter)
    }

    /// Drop a cached adapter (e.g. after a project's provider spec changes).
    pub fn invalidate(&self, spec: &ProviderSpec) {
        self.cache.write().remove(&fingerprint(spec));
    }

    /// Pre-seed the cache with a custom adapter for a spec. Used by
    /// embedders shipping their own adapter and by test harnesses.
    pub fn register_custom(&self, spec: &ProviderSpec, adapter: Arc<dyn ProviderAdapter>) {
        self.cache.write().insert(fingerprint(spec), adapter);
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn fingerprint(spec: &ProviderSpec) -> String {
    format!(
        "{}::{}::{}::{}",
        spec.provider,
        spec.model,
        spec.api_key_env_var,
        spec.base_url.as_deref().unwrap_or("-")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(provider: &str) -> ProviderSpec {
        ProviderSpec {
            provider: provider.into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key_env_var: "NEXUS_TEST_REGISTRY_KEY".into(),
            base_url: None,
            temperature: None,
            max_tokens: 4096,
        }
    }

    #[test]
    fn resolve_caches_by_fingerprint() {
        std::env::set_var("NEXUS_TEST_REGISTRY_KEY", "sk-test");
        let registry = ProviderRegistry::new();

        let a = registry.resolve(&spec("anthropic")).unwrap();
        let b = registry.resolve(&spec("anthropic")).unwrap();
        assert_eq!(registry.cached_count(), 1);
        assert_eq!(a.provider_id(), b.provider_id());

        registry.invalidate(&spec("anthropic"));
        assert_eq!(registry.cached_count(), 0);
        std::env::remove_var("NEXUS_TEST_REGISTRY_KEY");
    }

    #[test]
    fn unknown_provider_is_a_validation_error() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve(&spec("mystery")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn missing_key_env_var_fails() {
        let registry = ProviderRegistry::new();
        std::env::remove_var("NEXUS_TEST_REGISTRY_KEY");
        let err = registry.resolve(&spec("anthropic")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
