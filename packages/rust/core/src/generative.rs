//! Generative image fallback.
//!
//! Used only when stock search comes back empty. Results are cached under a
//! key derived from the prompt, so a prompt is generated at most once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use pagekit_cache::{AssetCache, CacheEntry, CacheKey};
use pagekit_shared::{
    CallBudget, GenerationConfig, ImageCandidate, Orientation, PagekitError, ProviderName, Result,
    resolve_api_key,
};

use crate::downloader::{normalize_prefix, public_url, read_capped};
use crate::mime;

const USER_AGENT: &str = concat!("pagekit/", env!("CARGO_PKG_VERSION"));
const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Size cap on a generated image unless overridden with
/// [`OpenAiImageGenerator::with_max_bytes`].
const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Generator trait
// ---------------------------------------------------------------------------

/// Raw output of an image model.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A remote text-to-image model.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, orientation: Orientation) -> Result<GeneratedImage>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible generator
// ---------------------------------------------------------------------------

/// `POST {base_url}/images/generations` with a Bearer key.
pub struct OpenAiImageGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_bytes: u64,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: String,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GenerationData>,
}

#[derive(Deserialize)]
struct GenerationData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl OpenAiImageGenerator {
    pub fn new(base_url: &str, api_key: String, model: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(GENERATION_TIMEOUT)
            .build()
            .map_err(|e| PagekitError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }

    /// Reject generated images larger than `max_bytes`, whether inline or
    /// behind a URL.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len as u64 > self.max_bytes {
            return Err(PagekitError::Generation(format!(
                "image is {len} bytes, over the {} byte limit",
                self.max_bytes
            )));
        }
        Ok(())
    }

    /// Build from `[generation]`. A missing credential is a config error.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = resolve_api_key(&config.api_key_env)
            .map_err(|e| PagekitError::config(format!("generation: {e}")))?;
        Self::new(&config.base_url, api_key, &config.model)
    }

    async fn fetch_url(&self, url: &str) -> Result<GeneratedImage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PagekitError::Generation(format!("image download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(PagekitError::Generation(format!(
                "image download returned HTTP {}",
                response.status()
            )));
        }
        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(mime::image_essence);
        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }
        let bytes = read_capped(response, self.max_bytes, |e| {
            PagekitError::Generation(format!("image download failed: {e}"))
        })
        .await?;
        let mime_type = header_mime
            .or_else(|| mime::sniff(&bytes).map(str::to_string))
            .unwrap_or_else(|| "image/png".to_string());
        Ok(GeneratedImage { bytes, mime_type })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str, orientation: Orientation) -> Result<GeneratedImage> {
        let (w, h) = orientation.dimensions();
        let body = GenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: format!("{w}x{h}"),
        };

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PagekitError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PagekitError::Generation("rate limited (HTTP 429)".into()));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(PagekitError::Generation(format!("HTTP {status}: {detail}")));
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| PagekitError::Generation(format!("malformed response: {e}")))?;
        let Some(data) = parsed.data.into_iter().next() else {
            return Err(PagekitError::Generation("response contained no image".into()));
        };

        match (data.b64_json, data.url) {
            (Some(b64), _) => {
                let bytes = STANDARD
                    .decode(b64.trim())
                    .map_err(|e| PagekitError::Generation(format!("invalid base64 image: {e}")))?;
                self.check_size(bytes.len())?;
                let mime_type = mime::sniff(&bytes).unwrap_or("image/png").to_string();
                Ok(GeneratedImage { bytes, mime_type })
            }
            (None, Some(url)) => self.fetch_url(&url).await,
            (None, None) => Err(PagekitError::Generation("response contained no image".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Prompt → cached image → candidate.
pub struct GenerativeFallback {
    generator: Arc<dyn ImageGenerator>,
    cache: Arc<AssetCache>,
    public_prefix: String,
}

impl GenerativeFallback {
    /// Fails if `public_prefix` would not yield valid image references.
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        cache: Arc<AssetCache>,
        public_prefix: &str,
    ) -> Result<Self> {
        Ok(Self {
            generator,
            cache,
            public_prefix: normalize_prefix(public_prefix)?,
        })
    }

    /// Generate (or reuse) an image for `prompt`.
    ///
    /// A cached prompt costs no budget. Errors are final; callers fall back to
    /// a placeholder rather than retrying.
    #[instrument(skip_all, fields(provenance = %provenance))]
    pub async fn generate(
        &self,
        prompt: &str,
        orientation: Orientation,
        provenance: &str,
        budget: &CallBudget,
    ) -> Result<ImageCandidate> {
        let key = CacheKey::for_prompt(prompt);
        if let Some(entry) = self.cache.lookup(&key).await {
            debug!("generated image served from cache");
            return Ok(self.candidate(prompt, orientation, &entry));
        }

        if !budget.try_acquire() {
            return Err(PagekitError::BudgetExhausted);
        }

        let image = self.generator.generate(prompt, orientation).await?;
        if image.bytes.is_empty() {
            return Err(PagekitError::Generation("model returned an empty image".into()));
        }
        let entry = self
            .cache
            .store(&key, &image.bytes, &image.mime_type, provenance)
            .await?;
        debug!(size_bytes = entry.size_bytes, "generated image cached");
        Ok(self.candidate(prompt, orientation, &entry))
    }

    fn candidate(&self, prompt: &str, orientation: Orientation, entry: &CacheEntry) -> ImageCandidate {
        let url = public_url(&self.public_prefix, entry);
        let (width, height) = orientation.dimensions();
        ImageCandidate {
            thumbnail_url: url.clone(),
            url,
            alt_text: prompt.to_string(),
            provider_name: ProviderName::Generative,
            width,
            height,
        }
    }
}
