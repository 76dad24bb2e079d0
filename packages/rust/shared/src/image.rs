//! Image candidates, provider names, and image-reference validation.

use serde::{Deserialize, Serialize};
use url::Url;

/// Image file extensions accepted for site-relative references.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "svg", "avif", "bin"];

// ---------------------------------------------------------------------------
// ProviderName
// ---------------------------------------------------------------------------

/// Where an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Unsplash,
    Pexels,
    Pixabay,
    Generative,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsplash => "unsplash",
            Self::Pexels => "pexels",
            Self::Pixabay => "pixabay",
            Self::Generative => "generative",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unsplash" => Ok(Self::Unsplash),
            "pexels" => Ok(Self::Pexels),
            "pixabay" => Ok(Self::Pixabay),
            "generative" => Ok(Self::Generative),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Orientation hint passed to providers and the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    Squarish,
}

impl Orientation {
    /// Nominal pixel size used for placeholders and generation requests.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Landscape => (1536, 1024),
            Self::Portrait => (1024, 1536),
            Self::Squarish => (1024, 1024),
        }
    }
}

// ---------------------------------------------------------------------------
// ImageCandidate
// ---------------------------------------------------------------------------

/// One search or generation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCandidate {
    pub url: String,
    pub thumbnail_url: String,
    pub alt_text: String,
    pub provider_name: ProviderName,
    pub width: u32,
    pub height: u32,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Whether `value` looks like a usable image reference.
///
/// Accepted forms: absolute `http(s)` URLs with a host, `data:image/...` URIs,
/// and site-relative paths (`/assets/x.png`) ending in an image extension.
/// Used both to decide whether a content field already holds an image and to
/// filter provider results.
pub fn is_valid_image_ref(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return false;
    }

    if let Some(rest) = value.strip_prefix("data:") {
        return rest.starts_with("image/") && rest.contains(',');
    }

    if value.starts_with('/') && !value.starts_with("//") {
        let path = value.split(['?', '#']).next().unwrap_or(value);
        return path
            .rsplit_once('.')
            .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    }

    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}
