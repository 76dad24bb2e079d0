//! Ordered fallback across stock providers.

use tracing::{debug, instrument, warn};

use pagekit_shared::{CallBudget, ImageCandidate, Orientation};

use crate::adapters::ProviderRegistry;

/// Parameters for one search.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub count: usize,
    pub orientation: Orientation,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            count: 1,
            orientation: Orientation::Landscape,
        }
    }
}

/// Queries providers one at a time, in priority order.
///
/// The first provider with a non-empty result wins. Failures are logged and
/// skipped. An empty result means "no stock image", not an error.
#[derive(Debug, Clone, Default)]
pub struct SearchOrchestrator {
    registry: ProviderRegistry,
}

impl SearchOrchestrator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Search without a call cap.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<ImageCandidate> {
        self.search_within(query, options, &CallBudget::unlimited())
            .await
    }

    /// Search, charging one unit of `budget` per provider call. Stops early
    /// once the budget is spent.
    #[instrument(skip_all, fields(query = %query, count = options.count))]
    pub async fn search_within(
        &self,
        query: &str,
        options: &SearchOptions,
        budget: &CallBudget,
    ) -> Vec<ImageCandidate> {
        if options.count == 0 {
            return Vec::new();
        }

        for provider in self.registry.iter() {
            let name = provider.name();
            if !budget.try_acquire() {
                debug!(provider = %name, "call budget exhausted, stopping search");
                break;
            }

            match provider
                .search(query, options.count, options.orientation)
                .await
            {
                Ok(results) if !results.is_empty() => {
                    debug!(provider = %name, results = results.len(), "stock search hit");
                    return results;
                }
                Ok(_) => {
                    debug!(provider = %name, "no results, trying next provider");
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "provider failed, trying next provider");
                }
            }
        }

        debug!("no stock result");
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pagekit_shared::{PagekitError, ProviderName, Result};

    use super::*;
    use crate::adapters::ImageProvider;

    enum Behavior {
        Empty,
        Fail,
        Results(usize),
    }

    struct FakeProvider {
        name: ProviderName,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: ProviderName, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageProvider for FakeProvider {
        fn name(&self) -> ProviderName {
            self.name
        }

        async fn search(
            &self,
            query: &str,
            count: usize,
            _orientation: Orientation,
        ) -> Result<Vec<ImageCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Empty => Ok(Vec::new()),
                Behavior::Fail => Err(PagekitError::provider(self.name.as_str(), "boom")),
                Behavior::Results(n) => Ok((0..n.min(count))
                    .map(|i| ImageCandidate {
                        url: format!("https://{}.example/{query}/{i}.jpg", self.name)
                            .replace(' ', "-"),
                        thumbnail_url: String::new(),
                        alt_text: query.to_string(),
                        provider_name: self.name,
                        width: 800,
                        height: 600,
                    })
                    .collect()),
            }
        }
    }

    fn orchestrator(providers: &[Arc<FakeProvider>]) -> SearchOrchestrator {
        SearchOrchestrator::new(ProviderRegistry::new(
            providers
                .iter()
                .map(|p| p.clone() as Arc<dyn ImageProvider>)
                .collect(),
        ))
    }

    #[tokio::test]
    async fn empty_first_provider_falls_through_to_second() {
        let a = FakeProvider::new(ProviderName::Unsplash, Behavior::Empty);
        let b = FakeProvider::new(ProviderName::Pexels, Behavior::Results(1));
        let c = FakeProvider::new(ProviderName::Pixabay, Behavior::Results(3));
        let search = orchestrator(&[a.clone(), b.clone(), c.clone()]);

        let results = search.search("bakery", &SearchOptions::default()).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider_name, ProviderName::Pexels);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_provider_is_skipped() {
        let a = FakeProvider::new(ProviderName::Unsplash, Behavior::Fail);
        let b = FakeProvider::new(ProviderName::Pixabay, Behavior::Results(2));
        let search = orchestrator(&[a, b]);

        let options = SearchOptions {
            count: 2,
            orientation: Orientation::Portrait,
        };
        let results = search.search("team", &options).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|c| c.provider_name == ProviderName::Pixabay));
    }

    #[tokio::test]
    async fn exhausted_providers_return_empty() {
        let a = FakeProvider::new(ProviderName::Unsplash, Behavior::Fail);
        let b = FakeProvider::new(ProviderName::Pexels, Behavior::Empty);
        let search = orchestrator(&[a, b]);

        assert!(search.search("x", &SearchOptions::default()).await.is_empty());
    }

    #[tokio::test]
    async fn budget_limits_provider_calls() {
        let a = FakeProvider::new(ProviderName::Unsplash, Behavior::Empty);
        let b = FakeProvider::new(ProviderName::Pexels, Behavior::Results(1));
        let search = orchestrator(&[a.clone(), b.clone()]);
        let budget = CallBudget::new(1);

        let results = search
            .search_within("x", &SearchOptions::default(), &budget)
            .await;

        assert!(results.is_empty());
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
        assert_eq!(budget.remaining(), 0);
    }

    #[tokio::test]
    async fn empty_registry_returns_empty() {
        let search = SearchOrchestrator::default();
        assert!(search.search("x", &SearchOptions::default()).await.is_empty());
    }
}
