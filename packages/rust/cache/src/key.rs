//! Content-addressable cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix that namespaces generation prompts away from fetch URLs.
const PROMPT_PREFIX: &str = "prompt:";

/// SHA-256 (lowercase hex) of an asset's source identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for an asset fetched from `url`.
    pub fn for_url(url: &str) -> Self {
        Self::digest(url.trim())
    }

    /// Key for an asset generated from `prompt`.
    pub fn for_prompt(prompt: &str) -> Self {
        Self::digest(&format!("{PROMPT_PREFIX}{}", prompt.trim()))
    }

    fn digest(source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
