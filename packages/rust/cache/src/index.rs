//! Durable cache index (`index.json`).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pagekit_shared::{PagekitError, Result};

use crate::key::CacheKey;

/// Extension used when the MIME type is unknown.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Metadata for one cached asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    /// File name relative to the cache directory.
    pub local_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Context the asset was fetched for (section id, page id, ...).
    pub provenance: String,
}

/// Key → entry map plus aggregates.
///
/// `total_size_bytes` always equals the sum of the entries' sizes; mutate
/// through [`CacheIndex::insert`] and [`CacheIndex::remove`] only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheIndex {
    entries: BTreeMap<CacheKey, CacheEntry>,
    total_size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_cleanup_at: Option<DateTime<Utc>>,
}

impl CacheIndex {
    /// Load an index from `path`. Missing file → empty index.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(PagekitError::io(path, e)),
        };

        let mut index: Self = serde_json::from_str(&content)
            .map_err(|e| PagekitError::Cache(format!("corrupt index {}: {e}", path.display())))?;
        index.recompute_total();
        Ok(index)
    }

    /// Write the index atomically (temp file + rename).
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PagekitError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| PagekitError::io(path, e))
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &CacheKey) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    /// Insert or replace an entry, keeping the size total in step.
    pub fn insert(&mut self, entry: CacheEntry) {
        self.total_size_bytes += entry.size_bytes;
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            self.total_size_bytes = self.total_size_bytes.saturating_sub(old.size_bytes);
        }
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.total_size_bytes = self.total_size_bytes.saturating_sub(removed.size_bytes);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size_bytes = 0;
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    pub fn last_cleanup_at(&self) -> Option<DateTime<Utc>> {
        self.last_cleanup_at
    }

    pub fn mark_cleanup(&mut self, at: DateTime<Utc>) {
        self.last_cleanup_at = Some(at);
    }

    /// Entries sorted least-recently-used first.
    pub fn lru_order(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.last_accessed_at);
        entries
    }

    fn recompute_total(&mut self) {
        self.total_size_bytes = self.entries.values().map(|e| e.size_bytes).sum();
    }
}

/// File extension for a MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        _ => FALLBACK_EXTENSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, size: u64) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key: CacheKey::for_url(key),
            local_path: format!("{}.png", CacheKey::for_url(key)),
            mime_type: "image/png".into(),
            size_bytes: size,
            created_at: now,
            last_accessed_at: now,
            provenance: "hero-1".into(),
        }
    }

    #[test]
    fn totals_follow_insert_replace_remove() {
        let mut index = CacheIndex::default();
        index.insert(entry("a", 10));
        index.insert(entry("b", 5));
        assert_eq!(index.total_size_bytes(), 15);

        index.insert(entry("a", 3));
        assert_eq!(index.total_size_bytes(), 8);
        assert_eq!(index.len(), 2);

        index.remove(&CacheKey::for_url("b"));
        assert_eq!(index.total_size_bytes(), 3);
        assert!(index.remove(&CacheKey::for_url("b")).is_none());
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/PNG; charset=binary"), "png");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("application/octet-stream"), FALLBACK_EXTENSION);
        assert_eq!(extension_for(""), FALLBACK_EXTENSION);
    }

    #[tokio::test]
    async fn load_recomputes_total() {
        let dir = std::env::temp_dir().join(format!("pk-index-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("index.json");

        let mut index = CacheIndex::default();
        index.insert(entry("a", 10));
        index.insert(entry("b", 20));
        index.total_size_bytes = 999; // simulate a stale aggregate
        index.persist(&path).await.unwrap();

        let loaded = CacheIndex::load(&path).await.unwrap();
        assert_eq!(loaded.total_size_bytes(), 30);
        assert_eq!(loaded.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
