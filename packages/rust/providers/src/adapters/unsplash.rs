//! Unsplash search client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use pagekit_shared::{ImageCandidate, Orientation, ProviderName, Result};

use super::{ImageProvider, keep_valid};
use crate::http::{build_client, get_json, trim_base};

const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";
const MAX_PER_PAGE: usize = 30;

/// `GET /search/photos` with `Authorization: Client-ID <key>`.
pub struct UnsplashProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl UnsplashProvider {
    pub fn new(api_key: String, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            base_url: trim_base(base_url.unwrap_or(DEFAULT_BASE_URL)),
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    urls: PhotoUrls,
    #[serde(default)]
    alt_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Deserialize)]
struct PhotoUrls {
    regular: String,
    #[serde(default)]
    thumb: String,
}

fn orientation_param(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Landscape => "landscape",
        Orientation::Portrait => "portrait",
        Orientation::Squarish => "squarish",
    }
}

#[async_trait]
impl ImageProvider for UnsplashProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Unsplash
    }

    #[instrument(skip_all, fields(provider = "unsplash", query = %query))]
    async fn search(
        &self,
        query: &str,
        count: usize,
        orientation: Orientation,
    ) -> Result<Vec<ImageCandidate>> {
        let per_page = count.clamp(1, MAX_PER_PAGE).to_string();
        let request = self
            .client
            .get(format!("{}/search/photos", self.base_url))
            .header("Authorization", format!("Client-ID {}", self.api_key))
            .header("Accept-Version", "v1")
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", orientation_param(orientation)),
                ("content_filter", "high"),
            ]);

        let response: SearchResponse = get_json(self.name(), request).await?;

        let candidates = response
            .results
            .into_iter()
            .map(|photo| ImageCandidate {
                url: photo.urls.regular,
                thumbnail_url: photo.urls.thumb,
                alt_text: photo
                    .alt_description
                    .or(photo.description)
                    .unwrap_or_else(|| query.to_string()),
                provider_name: ProviderName::Unsplash,
                width: photo.width,
                height: photo.height,
            })
            .collect();

        let candidates = keep_valid(candidates, count);
        tracing::debug!(results = candidates.len(), "unsplash search complete");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn maps_search_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/photos"))
            .and(header("Authorization", "Client-ID test-key"))
            .and(query_param("query", "bakery hero"))
            .and(query_param("orientation", "landscape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total": 2,
                "results": [
                    {
                        "width": 4000, "height": 3000,
                        "alt_description": "fresh bread on a counter",
                        "urls": { "regular": "https://images.unsplash.com/photo-1", "thumb": "https://images.unsplash.com/photo-1-thumb" }
                    },
                    {
                        "width": 3000, "height": 2000,
                        "alt_description": null,
                        "urls": { "regular": "https://images.unsplash.com/photo-2", "thumb": "https://images.unsplash.com/photo-2-thumb" }
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = UnsplashProvider::new("test-key".into(), Some(&server.uri())).unwrap();
        let results = provider
            .search("bakery hero", 5, Orientation::Landscape)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://images.unsplash.com/photo-1");
        assert_eq!(results[0].alt_text, "fresh bread on a counter");
        assert_eq!(results[0].width, 4000);
        assert_eq!(results[1].alt_text, "bakery hero");
        assert!(results.iter().all(|c| c.provider_name == ProviderName::Unsplash));
    }

    #[tokio::test]
    async fn unauthorized_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = UnsplashProvider::new("bad".into(), Some(&server.uri())).unwrap();
        let err = provider
            .search("anything", 1, Orientation::Portrait)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("credential rejected"));
    }
}
