//! Configuration for routing and collaboration

use crate::error::{MultiModelError, Result};
use crate::manager::CollaborationMode;
use crate::router::RoutingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Language of prompts and user-facing messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseLanguage {
    /// English (default)
    #[default]
    English,
    /// Chinese (中文)
    Chinese,
}

impl FromStr for ResponseLanguage {
    type Err = MultiModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "zh" | "cn" | "chinese" | "中文" => Ok(Self::Chinese),
            other => Err(MultiModelError::ConfigError(format!("unknown language '{other}'"))),
        }
    }
}

impl fmt::Display for ResponseLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::English => "en",
            Self::Chinese => "zh",
        })
    }
}

/// Configuration for collaboration runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    /// Strategy used when a request does not name one
    pub default_strategy: RoutingStrategy,

    /// Mode used when a request does not name one
    pub default_mode: CollaborationMode,

    /// Prompt and message language
    pub language: ResponseLanguage,

    /// Completion budget per call unless a role overrides it
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Upper bound for one provider call
    pub call_timeout: Duration,

    /// Upper bound for a whole collaboration run
    pub max_collaboration_time: Duration,

    /// Retries after a retryable failure
    pub max_retries: u32,

    /// Initial backoff duration for retries
    pub retry_backoff_base: Duration,

    /// Rounds in debate mode
    pub debate_rounds: u32,

    /// Upper bound for one provider availability probe
    pub probe_timeout: Duration,

    /// How long a probe result stays valid
    pub probe_ttl: Duration,

    /// Characters of each earlier output passed to later roles
    pub context_char_limit: usize,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            default_strategy: RoutingStrategy::Balanced,
            default_mode: CollaborationMode::Sequential,
            language: ResponseLanguage::English,
            max_tokens: 2000,
            temperature: 0.3,
            call_timeout: Duration::from_secs(90),
            max_collaboration_time: Duration::from_secs(600),  // 10 minutes
            max_retries: 1,
            retry_backoff_base: Duration::from_secs(1),
            debate_rounds: 2,
            probe_timeout: Duration::from_secs(5),
            probe_ttl: Duration::from_secs(300),               // 5 minutes
            context_char_limit: 4000,
        }
    }
}

impl CollaborationConfig {
    /// Create a new configuration builder
    pub fn builder() -> CollaborationConfigBuilder {
        CollaborationConfigBuilder::default()
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = agent_utils::load_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `COLLAB_*` environment overrides; a value that does not parse is a config error
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(strategy) = env_override("COLLAB_STRATEGY")? {
            self.default_strategy = strategy;
        }
        if let Some(mode) = env_override("COLLAB_MODE")? {
            self.default_mode = mode;
        }
        if let Some(language) = env_override("COLLAB_LANGUAGE")? {
            self.language = language;
        }
        if let Some(max_tokens) = env_override("COLLAB_MAX_TOKENS")? {
            self.max_tokens = max_tokens;
        }
        if let Some(rounds) = env_override("COLLAB_DEBATE_ROUNDS")? {
            self.debate_rounds = rounds;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(MultiModelError::ConfigError(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(MultiModelError::ConfigError(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }

        if self.call_timeout.is_zero() || self.max_collaboration_time.is_zero() {
            return Err(MultiModelError::ConfigError(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if self.max_retries > 3 {
            return Err(MultiModelError::ConfigError(
                "max_retries must be at most 3".to_string(),
            ));
        }

        if self.debate_rounds == 0 {
            return Err(MultiModelError::ConfigError(
                "debate_rounds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get retry backoff duration for attempt number
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base * 2_u32.pow(attempt)
    }
}

/// Builder for CollaborationConfig
#[derive(Debug, Default)]
pub struct CollaborationConfigBuilder {
    default_strategy: Option<RoutingStrategy>,
    default_mode: Option<CollaborationMode>,
    language: Option<ResponseLanguage>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    call_timeout: Option<Duration>,
    max_collaboration_time: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    debate_rounds: Option<u32>,
    probe_timeout: Option<Duration>,
    probe_ttl: Option<Duration>,
    context_char_limit: Option<usize>,
}

impl CollaborationConfigBuilder {
    pub fn default_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.default_strategy = Some(strategy);
        self
    }

    pub fn default_mode(mut self, mode: CollaborationMode) -> Self {
        self.default_mode = Some(mode);
        self
    }

    pub fn language(mut self, language: ResponseLanguage) -> Self {
        self.language = Some(language);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn call_timeout(mut self, duration: Duration) -> Self {
        self.call_timeout = Some(duration);
        self
    }

    pub fn max_collaboration_time(mut self, duration: Duration) -> Self {
        self.max_collaboration_time = Some(duration);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    pub fn debate_rounds(mut self, rounds: u32) -> Self {
        self.debate_rounds = Some(rounds);
        self
    }

    pub fn probe_timeout(mut self, duration: Duration) -> Self {
        self.probe_timeout = Some(duration);
        self
    }

    pub fn probe_ttl(mut self, duration: Duration) -> Self {
        self.probe_ttl = Some(duration);
        self
    }

    pub fn context_char_limit(mut self, limit: usize) -> Self {
        self.context_char_limit = Some(limit);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<CollaborationConfig> {
        let defaults = CollaborationConfig::default();

        let config = CollaborationConfig {
            default_strategy: self.default_strategy.unwrap_or(defaults.default_strategy),
            default_mode: self.default_mode.unwrap_or(defaults.default_mode),
            language: self.language.unwrap_or(defaults.language),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            call_timeout: self.call_timeout.unwrap_or(defaults.call_timeout),
            max_collaboration_time: self
                .max_collaboration_time
                .unwrap_or(defaults.max_collaboration_time),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            debate_rounds: self.debate_rounds.unwrap_or(defaults.debate_rounds),
            probe_timeout: self.probe_timeout.unwrap_or(defaults.probe_timeout),
            probe_ttl: self.probe_ttl.unwrap_or(defaults.probe_ttl),
            context_char_limit: self.context_char_limit.unwrap_or(defaults.context_char_limit),
        };

        config.validate()?;
        Ok(config)
    }
}

fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    agent_utils::env_parse(name).map_err(|e| MultiModelError::ConfigError(format!("{e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[allow(unsafe_code)]
    fn set_env(name: &str, value: &str) {
        // Only test_env_overrides touches COLLAB_* variables
        unsafe { std::env::set_var(name, value) };
    }

    #[allow(unsafe_code)]
    fn clear_env(name: &str) {
        unsafe { std::env::remove_var(name) };
    }

    #[test]
    fn test_default_config() {
        let config = CollaborationConfig::default();
        assert_eq!(config.default_strategy, RoutingStrategy::Balanced);
        assert_eq!(config.default_mode, CollaborationMode::Sequential);
        assert_eq!(config.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CollaborationConfig::builder()
            .default_strategy(RoutingStrategy::CostFirst)
            .language(ResponseLanguage::Chinese)
            .max_tokens(800)
            .debate_rounds(3)
            .build()
            .unwrap();

        assert_eq!(config.default_strategy, RoutingStrategy::CostFirst);
        assert_eq!(config.language, ResponseLanguage::Chinese);
        assert_eq!(config.max_tokens, 800);
        assert_eq!(config.debate_rounds, 3);
        assert_eq!(config.temperature, 0.3);
    }

    #[test]
    fn test_validation() {
        assert!(CollaborationConfig::builder().max_tokens(0).build().is_err());
        assert!(CollaborationConfig::builder().temperature(3.5).build().is_err());
        assert!(CollaborationConfig::builder().debate_rounds(0).build().is_err());
        assert!(CollaborationConfig::builder().max_retries(10).build().is_err());
        assert!(
            CollaborationConfig::builder()
                .call_timeout(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_retry_backoff() {
        let config = CollaborationConfig::default();
        assert_eq!(config.retry_backoff(0), Duration::from_secs(1));
        assert_eq!(config.retry_backoff(1), Duration::from_secs(2));
        assert_eq!(config.retry_backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("zh".parse::<ResponseLanguage>().unwrap(), ResponseLanguage::Chinese);
        assert_eq!("English".parse::<ResponseLanguage>().unwrap(), ResponseLanguage::English);
        assert!("klingon".parse::<ResponseLanguage>().is_err());
    }

    #[test]
    fn test_from_json_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"default_strategy": "cost_first", "default_mode": "debate", "language": "chinese"}}"#
        )
        .unwrap();

        let config = CollaborationConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.default_strategy, RoutingStrategy::CostFirst);
        assert_eq!(config.default_mode, CollaborationMode::Debate);
        assert_eq!(config.language, ResponseLanguage::Chinese);
        assert_eq!(config.max_tokens, 2000);
    }

    #[test]
    fn test_env_overrides() {
        set_env("COLLAB_STRATEGY", "cheapest");
        let err = CollaborationConfig::default().with_env_overrides().unwrap_err();
        assert!(matches!(&err, MultiModelError::ConfigError(msg) if msg.contains("COLLAB_STRATEGY")));

        set_env("COLLAB_STRATEGY", "cost-first");
        set_env("COLLAB_DEBATE_ROUNDS", "4");
        let config = CollaborationConfig::default().with_env_overrides().unwrap();
        assert_eq!(config.default_strategy, RoutingStrategy::CostFirst);
        assert_eq!(config.debate_rounds, 4);

        set_env("COLLAB_DEBATE_ROUNDS", "0");
        assert!(CollaborationConfig::default().with_env_overrides().is_err());

        clear_env("COLLAB_STRATEGY");
        clear_env("COLLAB_DEBATE_ROUNDS");
    }
}
