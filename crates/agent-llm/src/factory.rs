//! Static provider registration table
//!
//! Providers are registered explicitly at startup: each entry is a
//! [`ProviderFactory`] that knows how to build its client. Building a client is
//! also the cheap probe used to decide whether a provider is usable.

use crate::providers::{OpenAICompatConfig, OpenAICompatProvider};
use crate::{LLMError, LLMProvider, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Builds the client for one provider
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Provider name this factory registers (e.g. "deepseek")
    fn provider(&self) -> &str;

    /// Construct a ready-to-use client, or explain why it cannot be built
    async fn create(&self) -> Result<Arc<dyn LLMProvider>>;
}

/// Factory for an OpenAI-compatible endpoint configured from the environment
#[derive(Debug, Clone)]
pub struct OpenAICompatFactory {
    provider: String,
    default_api_base: String,
    key_env: String,
    base_env: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAICompatFactory {
    /// Register a provider; the key is read from `<PROVIDER>_API_KEY` and the
    /// base URL may be overridden with `<PROVIDER>_API_BASE`
    pub fn new(provider: impl Into<String>, default_api_base: impl Into<String>) -> Self {
        let provider = provider.into();
        let prefix = provider.to_uppercase().replace('-', "_");
        Self {
            key_env: format!("{prefix}_API_KEY"),
            base_env: format!("{prefix}_API_BASE"),
            provider,
            default_api_base: default_api_base.into(),
            api_key: None,
            timeout_secs: 120,
        }
    }

    /// Read the API key from a different environment variable
    pub fn with_key_env(mut self, key_env: impl Into<String>) -> Self {
        self.key_env = key_env.into();
        self
    }

    /// Use an explicit API key instead of the environment
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the client request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Environment variable holding the API key
    pub fn key_env(&self) -> &str {
        &self.key_env
    }

    fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.key_env).map_err(|_| {
            LLMError::ConfigurationError(format!(
                "{} environment variable not set",
                self.key_env
            ))
        })
    }
}

#[async_trait]
impl ProviderFactory for OpenAICompatFactory {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn create(&self) -> Result<Arc<dyn LLMProvider>> {
        let api_base =
            std::env::var(&self.base_env).unwrap_or_else(|_| self.default_api_base.clone());
        let config = OpenAICompatConfig::new(self.provider.clone(), self.resolve_api_key()?)
            .with_api_base(api_base)
            .with_timeout(self.timeout_secs);

        Ok(Arc::new(OpenAICompatProvider::with_config(config)?))
    }
}

/// The providers this workspace ships adapters for
pub fn builtin_factories() -> Vec<Arc<dyn ProviderFactory>> {
    vec![
        Arc::new(OpenAICompatFactory::new(
            "deepseek",
            "https://api.deepseek.com/v1",
        )),
        Arc::new(OpenAICompatFactory::new(
            "dashscope",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
        )),
        Arc::new(OpenAICompatFactory::new(
            "google",
            "https://generativelanguage.googleapis.com/v1beta/openai",
        )),
        Arc::new(OpenAICompatFactory::new(
            "siliconflow",
            "https://api.siliconflow.cn/v1",
        )),
        Arc::new(OpenAICompatFactory::new("openai", "https://api.openai.com/v1")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_names() {
        let factory = OpenAICompatFactory::new("deepseek", "https://api.deepseek.com/v1");
        assert_eq!(factory.key_env(), "DEEPSEEK_API_KEY");
        assert_eq!(factory.provider(), "deepseek");
    }

    #[test]
    fn test_builtin_table_is_unique() {
        let factories = builtin_factories();
        let mut names: Vec<_> = factories.iter().map(|f| f.provider().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), factories.len());
        assert!(names.contains(&"dashscope".to_string()));
    }

    #[tokio::test]
    async fn test_create_with_explicit_key() {
        let factory = OpenAICompatFactory::new("openai", "https://api.openai.com/v1")
            .with_api_key("sk-test");
        let provider = factory.create().await.unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[tokio::test]
    async fn test_create_without_key_fails() {
        let factory = OpenAICompatFactory::new("deepseek", "https://api.deepseek.com/v1")
            .with_key_env("AGENT_LLM_TEST_KEY_THAT_IS_NEVER_SET");
        let result = factory.create().await;
        assert!(matches!(result, Err(LLMError::ConfigurationError(_))));
    }
}
