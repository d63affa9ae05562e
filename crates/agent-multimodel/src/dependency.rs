//! Provider availability probing
//!
//! A probe builds the provider's client through its [`ProviderFactory`] on a
//! spawned task with a short timeout. Any error, timeout or panic marks the
//! provider unavailable; nothing is propagated. Results, including the built
//! client, are cached for a TTL so repeated checks do not re-probe.

use agent_llm::{LLMProvider, ProviderFactory, builtin_factories};
use cached::{Cached, TimedCache};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
enum ProbeOutcome {
    Available(Arc<dyn LLMProvider>),
    Unavailable(String),
}

struct Registered {
    factory: Arc<dyn ProviderFactory>,
    // Held while the factory builds a client, so concurrent checks of one provider share one build
    check_lock: tokio::sync::Mutex<()>,
}

/// Caches which providers can currently be used
pub struct DependencyChecker {
    factories: BTreeMap<String, Registered>,
    cache: Mutex<TimedCache<String, ProbeOutcome>>,
    probe_timeout: Duration,
}

impl DependencyChecker {
    /// Create a checker over an explicit factory table
    pub fn new(
        factories: Vec<Arc<dyn ProviderFactory>>,
        ttl: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let factories = factories
            .into_iter()
            .map(|factory| {
                let registered = Registered { factory, check_lock: tokio::sync::Mutex::new(()) };
                (registered.factory.provider().to_string(), registered)
            })
            .collect();
        Self {
            factories,
            cache: Mutex::new(TimedCache::with_lifespan(ttl)),
            probe_timeout,
        }
    }

    /// Create a checker over the built-in OpenAI-compatible providers
    pub fn with_builtin_factories(ttl: Duration, probe_timeout: Duration) -> Self {
        Self::new(builtin_factories(), ttl, probe_timeout)
    }

    /// Providers with a registered factory
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub async fn is_provider_available(&self, provider: &str) -> bool {
        matches!(self.probe(provider).await, ProbeOutcome::Available(_))
    }

    /// Probe every registered provider
    pub async fn check_all(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for provider in self.factories.keys() {
            let available = self.is_provider_available(provider).await;
            results.insert(provider.clone(), available);
        }
        info!(
            "Provider availability: {}/{} available",
            results.values().filter(|v| **v).count(),
            results.len()
        );
        results
    }

    /// Client built by the last successful probe
    pub async fn client(&self, provider: &str) -> Option<Arc<dyn LLMProvider>> {
        match self.probe(provider).await {
            ProbeOutcome::Available(client) => Some(client),
            ProbeOutcome::Unavailable(_) => None,
        }
    }

    /// Forget the cached result so the next check probes again
    pub async fn invalidate(&self, provider: &str) {
        let _ = self.cache().cache_remove(&provider.to_string());
    }

    fn cache(&self) -> MutexGuard<'_, TimedCache<String, ProbeOutcome>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn probe(&self, provider: &str) -> ProbeOutcome {
        let Some(registered) = self.factories.get(provider) else {
            return ProbeOutcome::Unavailable("no adapter registered".to_string());
        };

        // Only checks of the same provider wait on each other
        let _checking = registered.check_lock.lock().await;
        let key = provider.to_string();
        if let Some(outcome) = self.cache().cache_get(&key) {
            debug!("Probe cache hit for provider {}", provider);
            return outcome.clone();
        }

        let outcome = self.run_probe(Arc::clone(&registered.factory)).await;
        if let ProbeOutcome::Unavailable(reason) = &outcome {
            warn!("Provider {} unavailable: {}", provider, reason);
        } else {
            debug!("Provider {} available", provider);
        }
        let _ = self.cache().cache_set(key, outcome.clone());
        outcome
    }

    async fn run_probe(&self, factory: Arc<dyn ProviderFactory>) -> ProbeOutcome {
        let handle = tokio::spawn(async move { factory.create().await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.probe_timeout, handle).await {
            Ok(Ok(Ok(client))) => ProbeOutcome::Available(client),
            Ok(Ok(Err(e))) => ProbeOutcome::Unavailable(e.to_string()),
            Ok(Err(join_error)) => ProbeOutcome::Unavailable(format!("probe panicked: {join_error}")),
            Err(_) => {
                abort.abort();
                ProbeOutcome::Unavailable(format!(
                    "probe timed out after {:?}",
                    self.probe_timeout
                ))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_llm::{CompletionRequest, CompletionResponse, LLMError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn complete(&self, _request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
            Ok(CompletionResponse::from_text("ok", 1, 1))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    enum Behavior {
        Ok,
        Fail,
        Hang,
        Panic,
    }

    struct CountingFactory {
        provider: String,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl CountingFactory {
        fn new(provider: &str, behavior: Behavior) -> (Arc<dyn ProviderFactory>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let factory: Arc<dyn ProviderFactory> = Arc::new(Self {
                provider: provider.to_string(),
                behavior,
                calls: Arc::clone(&calls),
            });
            (factory, calls)
        }
    }

    #[async_trait]
    impl ProviderFactory for CountingFactory {
        fn provider(&self) -> &str {
            &self.provider
        }

        async fn create(&self) -> agent_llm::Result<Arc<dyn LLMProvider>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Ok => Ok(Arc::new(EchoProvider)),
                Behavior::Fail => Err(LLMError::ConfigurationError("KEY not set".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Arc::new(EchoProvider))
                },
                Behavior::Panic => panic!("adapter exploded"),
            }
        }
    }

    fn checker(factories: Vec<Arc<dyn ProviderFactory>>) -> DependencyChecker {
        DependencyChecker::new(factories, Duration::from_secs(300), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_probe_is_cached() {
        let (factory, calls) = CountingFactory::new("deepseek", Behavior::Ok);
        let checker = checker(vec![factory]);

        assert!(checker.is_provider_available("deepseek").await);
        assert!(checker.is_provider_available("deepseek").await);
        assert!(checker.client("deepseek").await.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_probe_once() {
        let (factory, calls) = CountingFactory::new("dashscope", Behavior::Ok);
        let checker = Arc::new(checker(vec![factory]));

        let checks = (0..10).map(|_| {
            let checker = Arc::clone(&checker);
            async move { checker.is_provider_available("dashscope").await }
        });
        let results = futures::future::join_all(checks).await;

        assert!(results.into_iter().all(|available| available));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_unavailable_and_cached() {
        let (factory, calls) = CountingFactory::new("openai", Behavior::Fail);
        let checker = checker(vec![factory]);

        assert!(!checker.is_provider_available("openai").await);
        assert!(!checker.is_provider_available("openai").await);
        assert!(checker.client("openai").await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hanging_probe_times_out() {
        let (factory, _) = CountingFactory::new("google", Behavior::Hang);
        let checker = checker(vec![factory]);
        assert!(!checker.is_provider_available("google").await);
    }

    #[tokio::test]
    async fn test_hanging_provider_does_not_block_others() {
        let (slow, _) = CountingFactory::new("google", Behavior::Hang);
        let (fast, calls) = CountingFactory::new("deepseek", Behavior::Ok);
        let checker = Arc::new(DependencyChecker::new(
            vec![slow, fast],
            Duration::from_secs(300),
            Duration::from_secs(30),
        ));

        let hanging = {
            let checker = Arc::clone(&checker);
            tokio::spawn(async move { checker.is_provider_available("google").await })
        };
        tokio::task::yield_now().await;

        let available =
            tokio::time::timeout(Duration::from_secs(1), checker.is_provider_available("deepseek"))
                .await;
        assert_eq!(available.ok(), Some(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        hanging.abort();
    }

    #[tokio::test]
    async fn test_panicking_probe_is_contained() {
        let (factory, _) = CountingFactory::new("siliconflow", Behavior::Panic);
        let checker = checker(vec![factory]);
        assert!(!checker.is_provider_available("siliconflow").await);
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let checker = checker(vec![]);
        assert!(!checker.is_provider_available("anthropic").await);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reprobe() {
        let (factory, calls) = CountingFactory::new("deepseek", Behavior::Ok);
        let checker = checker(vec![factory]);

        checker.is_provider_available("deepseek").await;
        checker.invalidate("deepseek").await;
        checker.is_provider_available("deepseek").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_reprobes() {
        let (factory, calls) = CountingFactory::new("deepseek", Behavior::Ok);
        let checker =
            DependencyChecker::new(vec![factory], Duration::from_millis(50), Duration::from_secs(1));

        checker.is_provider_available("deepseek").await;
        std::thread::sleep(Duration::from_millis(120));
        checker.is_provider_available("deepseek").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_check_all() {
        let (ok, _) = CountingFactory::new("deepseek", Behavior::Ok);
        let (bad, _) = CountingFactory::new("openai", Behavior::Fail);
        let checker = checker(vec![ok, bad]);

        let results = checker.check_all().await;
        assert_eq!(results.get("deepseek"), Some(&true));
        assert_eq!(results.get("openai"), Some(&false));
        assert_eq!(checker.providers().count(), 2);
    }
}
