//! Fetch candidate bytes into the asset cache.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

use pagekit_cache::{AssetCache, CacheEntry, CacheKey};
use pagekit_shared::{CallBudget, ImageCandidate, PagekitError, Result, is_valid_image_ref};

use crate::mime;

const USER_AGENT: &str = concat!("pagekit/", env!("CARGO_PKG_VERSION"));
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads candidates through the shared [`AssetCache`].
pub struct Downloader {
    client: Client,
    cache: Arc<AssetCache>,
    max_bytes: u64,
    public_prefix: String,
}

impl Downloader {
    /// `public_prefix` is prepended to cached file names to form the
    /// reference written into content (e.g. `/assets/cache`).
    pub fn new(cache: Arc<AssetCache>, max_bytes: u64, public_prefix: &str) -> Result<Self> {
        let public_prefix = normalize_prefix(public_prefix)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| PagekitError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            cache,
            max_bytes,
            public_prefix,
        })
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    /// Cached entry for `candidate`, downloading it on a miss.
    ///
    /// A hit costs no budget. A miss takes one unit of `budget` before the
    /// request goes out.
    #[instrument(skip_all, fields(url = %candidate.url, provenance = %provenance))]
    pub async fn fetch(
        &self,
        candidate: &ImageCandidate,
        provenance: &str,
        budget: &CallBudget,
    ) -> Result<CacheEntry> {
        let key = CacheKey::for_url(&candidate.url);
        if let Some(entry) = self.cache.lookup(&key).await {
            debug!("cache hit");
            return Ok(entry);
        }

        if !budget.try_acquire() {
            return Err(PagekitError::BudgetExhausted);
        }

        let (bytes, mime_type) = self.download(&candidate.url).await?;
        debug!(size_bytes = bytes.len(), mime_type = %mime_type, "downloaded");
        self.cache.store(&key, &bytes, &mime_type, provenance).await
    }

    /// Reference written into the content tree for a cached asset.
    pub fn public_url(&self, entry: &CacheEntry) -> String {
        public_url(&self.public_prefix, entry)
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PagekitError::Network(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PagekitError::Network(format!("GET {url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length().filter(|len| *len > self.max_bytes) {
            return Err(PagekitError::validation(format!(
                "{url} is {len} bytes, over the {} byte download limit",
                self.max_bytes
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = read_capped(response, self.max_bytes, |e| {
            PagekitError::Network(format!("GET {url} body failed: {e}"))
        })
        .await?;

        let mime_type = resolve_mime(&content_type, url, &bytes).ok_or_else(|| {
            PagekitError::validation(format!("{url} is not an image ({content_type})"))
        })?;
        Ok((bytes, mime_type))
    }
}

/// `Content-Type` if it names an image; otherwise, for generic or missing
/// types only, magic bytes and then the URL extension.
fn resolve_mime(content_type: &str, url: &str, bytes: &[u8]) -> Option<String> {
    if let Some(essence) = mime::image_essence(content_type) {
        return Some(essence);
    }
    if !mime::is_generic(content_type) {
        return None;
    }
    mime::sniff(bytes)
        .or_else(|| mime::from_url(url))
        .map(str::to_string)
}

/// Read a response body, failing once it grows past `max_bytes`. Transport
/// errors are mapped through `on_error`.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    max_bytes: u64,
    on_error: impl Fn(reqwest::Error) -> PagekitError,
) -> Result<Vec<u8>> {
    let url = response.url().to_string();
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(&on_error)? {
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(PagekitError::validation(format!(
                "{url} exceeds the {max_bytes} byte download limit"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Trim a public URL prefix, rejecting one whose references would fail the
/// image-reference check (e.g. `assets/cache` without a leading slash).
pub(crate) fn normalize_prefix(prefix: &str) -> Result<String> {
    let prefix = prefix.trim().trim_end_matches('/');
    if !is_valid_image_ref(&format!("{prefix}/asset.png")) {
        return Err(PagekitError::config(format!(
            "public url prefix '{prefix}' must be an absolute path like /assets/cache or an http(s) URL"
        )));
    }
    Ok(prefix.to_string())
}

/// `{prefix}/{file name}`.
pub(crate) fn public_url(prefix: &str, entry: &CacheEntry) -> String {
    format!("{prefix}/{}", entry.local_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagekit_shared::{CacheSettings, ProviderName, is_valid_image_ref};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    async fn downloader(tag: &str, max_bytes: u64) -> (Downloader, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("pk-dl-{tag}-{}", uuid::Uuid::now_v7()));
        let cache = AssetCache::open(CacheSettings::at(&dir)).await.unwrap();
        let downloader = Downloader::new(Arc::new(cache), max_bytes, "/assets/cache/").unwrap();
        (downloader, dir)
    }

    fn candidate(url: String) -> ImageCandidate {
        ImageCandidate {
            thumbnail_url: url.clone(),
            url,
            alt_text: "bread".into(),
            provider_name: ProviderName::Pexels,
            width: 100,
            height: 100,
        }
    }

    #[tokio::test]
    async fn downloads_once_then_serves_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(PNG),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (dl, dir) = downloader("once", 1024).await;
        let budget = CallBudget::new(10);
        let c = candidate(format!("{}/photo", server.uri()));

        let first = dl.fetch(&c, "hero-1", &budget).await.unwrap();
        let second = dl.fetch(&c, "hero-1", &budget).await.unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(first.provenance, "hero-1");
        assert_eq!(budget.used(), 1);
        assert_eq!(dl.cache().read(&first).await.unwrap(), PNG);

        let url = dl.public_url(&first);
        assert!(url.starts_with("/assets/cache/"));
        assert!(url.ends_with(".png"));
        assert!(is_valid_image_ref(&url));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn octet_stream_falls_back_to_sniffing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(PNG),
            )
            .mount(&server)
            .await;

        let (dl, dir) = downloader("sniff", 1024).await;
        let entry = dl
            .fetch(&candidate(format!("{}/x", server.uri())), "p", &CallBudget::unlimited())
            .await
            .unwrap();
        assert_eq!(entry.mime_type, "image/png");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn html_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let (dl, dir) = downloader("html", 1024).await;
        let err = dl
            .fetch(&candidate(format!("{}/a.jpg", server.uri())), "p", &CallBudget::unlimited())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not an image"));
        assert_eq!(dl.cache().stats().await.entry_count, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0u8; 4096]),
            )
            .mount(&server)
            .await;

        let (dl, dir) = downloader("big", 1024).await;
        let err = dl
            .fetch(&candidate(format!("{}/big.jpg", server.uri())), "p", &CallBudget::unlimited())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("download limit"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn exhausted_budget_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .expect(0)
            .mount(&server)
            .await;

        let (dl, dir) = downloader("budget", 1024).await;
        let err = dl
            .fetch(&candidate(format!("{}/a.png", server.uri())), "p", &CallBudget::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, PagekitError::BudgetExhausted));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn mime_resolution_order() {
        assert_eq!(resolve_mime("image/webp", "https://x/a.png", b"").as_deref(), Some("image/webp"));
        assert_eq!(resolve_mime("", "https://x/a.gif", b"").as_deref(), Some("image/gif"));
        assert_eq!(resolve_mime("text/plain", "https://x/a.gif", b""), None);
    }

    #[tokio::test]
    async fn relative_public_prefix_is_rejected() {
        let dir = std::env::temp_dir().join(format!("pk-dl-prefix-{}", uuid::Uuid::now_v7()));
        let cache = Arc::new(AssetCache::open(CacheSettings::at(&dir)).await.unwrap());

        let err = Downloader::new(cache.clone(), 1024, "assets/cache").err().unwrap();
        assert!(matches!(err, PagekitError::Config { .. }));
        assert!(Downloader::new(cache.clone(), 1024, "https://cdn.example.com/assets/").is_ok());
        assert!(Downloader::new(cache, 1024, "").is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
