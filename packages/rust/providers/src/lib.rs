//! Stock-photo providers and the ordered search over them.
//!
//! - [`ImageProvider`]: one external search service
//! - [`ProviderRegistry`]: enabled providers in priority order, built from config
//! - [`SearchOrchestrator`]: first non-empty result wins, failures fall through

pub mod adapters;
mod http;
pub mod orchestrator;

pub use adapters::{
    ImageProvider, PexelsProvider, PixabayProvider, ProviderRegistry, UnsplashProvider,
};
pub use orchestrator::{SearchOptions, SearchOrchestrator};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pagekit_shared::{Orientation, ProviderName};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Real clients behind mock servers: a rate-limited first provider
    /// falls through to the second.
    #[tokio::test]
    async fn rate_limited_provider_falls_through_over_http() {
        let unsplash = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/photos"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&unsplash)
            .await;

        let pexels = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "photos": [{
                    "width": 1600, "height": 1067, "alt": "bakery storefront",
                    "src": { "large2x": "https://images.pexels.com/photos/9/b.jpeg", "tiny": "https://images.pexels.com/photos/9/t.jpeg" }
                }]
            })))
            .expect(1)
            .mount(&pexels)
            .await;

        let registry = ProviderRegistry::new(vec![
            Arc::new(UnsplashProvider::new("u".into(), Some(&unsplash.uri())).unwrap()),
            Arc::new(PexelsProvider::new("p".into(), Some(&pexels.uri())).unwrap()),
        ]);
        let search = SearchOrchestrator::new(registry);

        let results = search
            .search(
                "bakery business professional modern hero",
                &SearchOptions {
                    count: 1,
                    orientation: Orientation::Landscape,
                },
            )
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider_name, ProviderName::Pexels);
        assert_eq!(results[0].url, "https://images.pexels.com/photos/9/b.jpeg");
    }
}
