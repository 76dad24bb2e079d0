//! Stock-photo provider trait and built-in clients.
//!
//! Each client wraps one search API (authentication, endpoint shape, and the
//! mapping from its JSON to [`ImageCandidate`]). Clients are held by a
//! [`ProviderRegistry`] in priority order.

mod pexels;
mod pixabay;
mod unsplash;

use std::sync::Arc;

use async_trait::async_trait;

use pagekit_shared::{
    AppConfig, ImageCandidate, Orientation, PagekitError, ProviderName, Result, resolve_api_key,
};

pub use pexels::PexelsProvider;
pub use pixabay::PixabayProvider;
pub use unsplash::UnsplashProvider;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A stock-photo search service.
///
/// Transport, auth, and status failures come back as
/// [`PagekitError::Provider`]; the orchestrator treats them as "try the next
/// provider".
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider identity, recorded on every candidate it returns.
    fn name(&self) -> ProviderName;

    /// Search for up to `count` images matching `query`, ranked by relevance.
    async fn search(
        &self,
        query: &str,
        count: usize,
        orientation: Orientation,
    ) -> Result<Vec<ImageCandidate>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds providers in priority order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    /// Registry over an explicit provider list (first = highest priority).
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>) -> Self {
        Self { providers }
    }

    /// Build the enabled providers in `providers.order`.
    ///
    /// A missing credential for an enabled provider is a configuration error.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut providers: Vec<Arc<dyn ImageProvider>> = Vec::new();

        for name in config.providers.priority()? {
            let Some(settings) = config.providers.get(name) else {
                continue;
            };
            if !settings.enabled {
                tracing::debug!(provider = %name, "provider disabled, skipping");
                continue;
            }

            let key_env = config.providers.api_key_env(name);
            let api_key = resolve_api_key(&key_env)
                .map_err(|e| PagekitError::config(format!("{name}: {e}")))?;
            let base_url = settings.base_url.as_deref();

            let provider: Arc<dyn ImageProvider> = match name {
                ProviderName::Unsplash => Arc::new(UnsplashProvider::new(api_key, base_url)?),
                ProviderName::Pexels => Arc::new(PexelsProvider::new(api_key, base_url)?),
                ProviderName::Pixabay => Arc::new(PixabayProvider::new(api_key, base_url)?),
                ProviderName::Generative => continue,
            };
            providers.push(provider);
        }

        tracing::debug!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "provider registry built"
        );
        Ok(Self { providers })
    }

    /// Providers in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ImageProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

/// Keep candidates with a usable URL, capped at `count`.
pub(crate) fn keep_valid(candidates: Vec<ImageCandidate>, count: usize) -> Vec<ImageCandidate> {
    candidates
        .into_iter()
        .filter(|c| pagekit_shared::is_valid_image_ref(&c.url))
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> ImageCandidate {
        ImageCandidate {
            url: url.into(),
            thumbnail_url: String::new(),
            alt_text: String::new(),
            provider_name: ProviderName::Pexels,
            width: 10,
            height: 10,
        }
    }

    #[test]
    fn keep_valid_drops_bad_urls_and_truncates() {
        let kept = keep_valid(
            vec![
                candidate("not a url"),
                candidate("https://img.example/a.jpg"),
                candidate(""),
                candidate("https://img.example/b.jpg"),
                candidate("https://img.example/c.jpg"),
            ],
            2,
        );
        let urls: Vec<_> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, ["https://img.example/a.jpg", "https://img.example/b.jpg"]);
    }

    #[test]
    fn from_config_skips_disabled_providers() {
        let mut config = AppConfig::default();
        config.providers.unsplash.enabled = false;
        config.providers.pexels.enabled = false;
        config.providers.pixabay.enabled = false;

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn from_config_rejects_missing_credential() {
        let mut config = AppConfig::default();
        config.providers.order = vec!["pexels".into()];
        config.providers.pexels.api_key_env =
            Some(format!("PAGEKIT_TEST_MISSING_{}", std::process::id()));

        let err = ProviderRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, PagekitError::Config { .. }));
        assert!(err.to_string().contains("pexels"));
    }

    #[test]
    fn from_config_rejects_unknown_provider() {
        let mut config = AppConfig::default();
        config.providers.order = vec!["flickr".into()];
        assert!(ProviderRegistry::from_config(&config).is_err());
    }
}
