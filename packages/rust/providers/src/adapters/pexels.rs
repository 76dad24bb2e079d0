//! Pexels search client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use pagekit_shared::{ImageCandidate, Orientation, ProviderName, Result};

use super::{ImageProvider, keep_valid};
use crate::http::{build_client, get_json, trim_base};

const DEFAULT_BASE_URL: &str = "https://api.pexels.com";
const MAX_PER_PAGE: usize = 80;

/// `GET /v1/search` with the raw key in `Authorization`.
pub struct PexelsProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PexelsProvider {
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
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    src: PhotoSources,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Deserialize)]
struct PhotoSources {
    large2x: String,
    #[serde(default)]
    tiny: String,
}

fn orientation_param(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Landscape => "landscape",
        Orientation::Portrait => "portrait",
        Orientation::Squarish => "square",
    }
}

#[async_trait]
impl ImageProvider for PexelsProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Pexels
    }

    #[instrument(skip_all, fields(provider = "pexels", query = %query))]
    async fn search(
        &self,
        query: &str,
        count: usize,
        orientation: Orientation,
    ) -> Result<Vec<ImageCandidate>> {
        let per_page = count.clamp(1, MAX_PER_PAGE).to_string();
        let request = self
            .client
            .get(format!("{}/v1/search", self.base_url))
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", orientation_param(orientation)),
            ]);

        let response: SearchResponse = get_json(self.name(), request).await?;

        let candidates = response
            .photos
            .into_iter()
            .map(|photo| ImageCandidate {
                url: photo.src.large2x,
                thumbnail_url: photo.src.tiny,
                alt_text: photo
                    .alt
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| query.to_string()),
                provider_name: ProviderName::Pexels,
                width: photo.width,
                height: photo.height,
            })
            .collect();

        let candidates = keep_valid(candidates, count);
        tracing::debug!(results = candidates.len(), "pexels search complete");
        Ok(candidates)
    }
}
