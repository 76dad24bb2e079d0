//! Pixabay search client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use pagekit_shared::{ImageCandidate, Orientation, ProviderName, Result};

use super::{ImageProvider, keep_valid};
use crate::http::{build_client, get_json, trim_base};

const DEFAULT_BASE_URL: &str = "https://pixabay.com";
/// Pixabay rejects `per_page` below 3.
const MIN_PER_PAGE: usize = 3;
const MAX_PER_PAGE: usize = 200;

/// `GET /api/?key=<key>`.
pub struct PixabayProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PixabayProvider {
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
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hit {
    #[serde(rename = "largeImageURL")]
    large_image_url: String,
    #[serde(rename = "previewURL", default)]
    preview_url: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
}

fn orientation_param(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Landscape => "horizontal",
        Orientation::Portrait => "vertical",
        Orientation::Squarish => "all",
    }
}

#[async_trait]
impl ImageProvider for PixabayProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Pixabay
    }

    #[instrument(skip_all, fields(provider = "pixabay", query = %query))]
    async fn search(
        &self,
        query: &str,
        count: usize,
        orientation: Orientation,
    ) -> Result<Vec<ImageCandidate>> {
        let per_page = count.clamp(MIN_PER_PAGE, MAX_PER_PAGE).to_string();
        let request = self
            .client
            .get(format!("{}/api/", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("image_type", "photo"),
                ("safesearch", "true"),
                ("per_page", per_page.as_str()),
                ("orientation", orientation_param(orientation)),
            ]);

        let response: SearchResponse = get_json(self.name(), request).await?;

        let candidates = response
            .hits
            .into_iter()
            .map(|hit| ImageCandidate {
                url: hit.large_image_url,
                thumbnail_url: hit.preview_url,
                alt_text: if hit.tags.trim().is_empty() {
                    query.to_string()
                } else {
                    hit.tags
                },
                provider_name: ProviderName::Pixabay,
                width: hit.image_width,
                height: hit.image_height,
            })
            .collect();

        let candidates = keep_valid(candidates, count);
        tracing::debug!(results = candidates.len(), "pixabay search complete");
        Ok(candidates)
    }
}
