//! Disk-backed, content-addressable asset cache.
//!
//! The [`AssetCache`] maps a source identifier (fetch URL or generation
//! prompt) to a locally persisted file. Layout on disk:
//!
//! ```text
//! <cache dir>/
//!   index.json            key → entry metadata, total size, last cleanup
//!   <key>.<ext>           one data file per asset
//! ```
//!
//! **Concurrency rules:**
//! - Every index mutation (store, eviction, sweep, clear, lookup touch,
//!   self-heal purge) holds the index write lock for its whole
//!   read-modify-write, including the index persist.
//! - The presence check in [`AssetCache::lookup`] runs under the read lock, so
//!   concurrent lookups proceed in parallel.
//! - The index file is replaced atomically; a reader never sees a half-written index.

mod index;
mod key;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use pagekit_shared::{CacheSettings, PagekitError, Result};

pub use index::{CacheEntry, CacheIndex, FALLBACK_EXTENSION, extension_for};
pub use key::CacheKey;

/// Index file name inside the cache directory.
const INDEX_FILE_NAME: &str = "index.json";

/// Suffix for data files that are still being written.
const PARTIAL_SUFFIX: &str = ".part";

/// Read-only diagnostics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub oldest_created_at: Option<DateTime<Utc>>,
    pub newest_created_at: Option<DateTime<Utc>>,
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Eviction {
    removed: usize,
    freed_bytes: u64,
}

/// Primary cache handle. Construct once per process and share as `Arc<AssetCache>`.
pub struct AssetCache {
    settings: CacheSettings,
    index_path: PathBuf,
    index: RwLock<CacheIndex>,
}

impl AssetCache {
    /// Open (or create) the cache at `settings.dir`.
    ///
    /// A corrupt index is logged and replaced with an empty one; the data
    /// files it referenced become unreachable and are removed by [`clear`](Self::clear).
    pub async fn open(settings: CacheSettings) -> Result<Self> {
        tokio::fs::create_dir_all(&settings.dir)
            .await
            .map_err(|e| PagekitError::io(&settings.dir, e))?;

        let index_path = settings.dir.join(INDEX_FILE_NAME);
        let index = match CacheIndex::load(&index_path).await {
            Ok(index) => index,
            Err(PagekitError::Cache(msg)) => {
                warn!(path = ?index_path, error = %msg, "discarding unreadable cache index");
                CacheIndex::default()
            }
            Err(e) => return Err(e),
        };

        info!(
            dir = ?settings.dir,
            entries = index.len(),
            total_size_bytes = index.total_size_bytes(),
            capacity_bytes = settings.capacity_bytes,
            "asset cache opened"
        );

        Ok(Self {
            settings,
            index_path,
            index: RwLock::new(index),
        })
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.settings.dir
    }

    /// Absolute path of an entry's data file.
    pub fn path_for(&self, entry: &CacheEntry) -> PathBuf {
        self.settings.dir.join(&entry.local_path)
    }

    /// Whether the index currently holds `key`. Does not touch the entry.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.index.read().await.get(key).is_some()
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Look up `key`. A hit refreshes `last_accessed_at`; an entry whose data
    /// file has disappeared is purged and reported as a miss.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let candidate = self.index.read().await.get(key).cloned()?;
        let present = tokio::fs::try_exists(self.path_for(&candidate))
            .await
            .unwrap_or(false);

        let mut index = self.index.write().await;

        if !present {
            // Only purge if nobody replaced the entry while we were checking.
            let unchanged = index
                .get(key)
                .is_some_and(|e| e.local_path == candidate.local_path);
            if unchanged {
                index.remove(key);
                self.persist_logged(&index).await;
                debug!(path = %candidate.local_path, "backing file missing, entry purged");
            }
            return None;
        }

        let entry = index.get_mut(key)?;
        entry.last_accessed_at = Utc::now();
        let hit = entry.clone();
        self.persist_logged(&index).await;
        debug!(size_bytes = hit.size_bytes, "cache hit");
        Some(hit)
    }

    /// Read the bytes backing `entry`.
    pub async fn read(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        let path = self.path_for(entry);
        tokio::fs::read(&path)
            .await
            .map_err(|e| PagekitError::io(path, e))
    }

    // -----------------------------------------------------------------------
    // Store
    // -----------------------------------------------------------------------

    /// Persist `bytes` under `key`.
    ///
    /// Runs an eviction pass first if the write would exceed capacity. The
    /// index is only updated after the data file is fully written, so a
    /// failed write never leaves an entry behind.
    #[instrument(skip_all, fields(key = %key, size_bytes = bytes.len(), mime_type = %mime_type))]
    pub async fn store(
        &self,
        key: &CacheKey,
        bytes: &[u8],
        mime_type: &str,
        provenance: &str,
    ) -> Result<CacheEntry> {
        let incoming = bytes.len() as u64;
        let mut index = self.index.write().await;

        let replaced = index.get(key).map(|e| e.size_bytes).unwrap_or(0);
        let projected = index.total_size_bytes().saturating_sub(replaced) + incoming;
        if projected > self.settings.capacity_bytes {
            let eviction = self.evict(&mut index, incoming).await;
            debug!(
                removed = eviction.removed,
                freed_bytes = eviction.freed_bytes,
                "eviction pass complete"
            );
        }

        let file_name = format!("{key}.{}", extension_for(mime_type));
        let path = self.settings.dir.join(&file_name);
        let tmp = self.settings.dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));

        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PagekitError::io(tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PagekitError::io(path, e));
        }

        // A replaced entry with a different extension leaves an orphan file.
        if let Some(old) = index.get(key) {
            if old.local_path != file_name {
                let old_path = self.path_for(old);
                if let Err(e) = tokio::fs::remove_file(&old_path).await {
                    debug!(path = ?old_path, error = %e, "could not remove replaced file");
                }
            }
        }

        let now = Utc::now();
        let entry = CacheEntry {
            key: key.clone(),
            local_path: file_name,
            mime_type: mime_type.to_string(),
            size_bytes: incoming,
            created_at: now,
            last_accessed_at: now,
            provenance: provenance.to_string(),
        };
        index.insert(entry.clone());
        if let Err(e) = index.persist(&self.index_path).await {
            // The data file may already have replaced an older one, so the
            // key is dropped entirely rather than restored.
            index.remove(key);
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                debug!(path = ?path, error = %rm, "could not remove unindexed file");
            }
            return Err(e);
        }

        debug!(total_size_bytes = index.total_size_bytes(), "asset stored");
        Ok(entry)
    }

    // -----------------------------------------------------------------------
    // Eviction & maintenance
    // -----------------------------------------------------------------------

    /// Best-effort eviction, called with the write lock held.
    ///
    /// Walks entries least-recently-used first. Expired entries are always
    /// deleted; others are deleted only while the freed total is short of
    /// `incoming` plus the safety margin. Deletion failures are logged and
    /// the entry is kept.
    async fn evict(&self, index: &mut CacheIndex, incoming: u64) -> Eviction {
        let now = Utc::now();
        let target = incoming.saturating_add(self.settings.eviction_margin_bytes);
        let mut outcome = Eviction::default();

        for entry in index.lru_order() {
            let expired = self.is_expired(&entry, now);
            let short = outcome.freed_bytes < target;
            if !expired && !short {
                continue;
            }

            if self.delete_file(&entry).await {
                index.remove(&entry.key);
                outcome.removed += 1;
                outcome.freed_bytes += entry.size_bytes;
                debug!(key = %entry.key, expired, size_bytes = entry.size_bytes, "evicted");
            }
        }

        if outcome.freed_bytes < target {
            debug!(
                freed_bytes = outcome.freed_bytes,
                target,
                "eviction could not reach target, write proceeds over capacity"
            );
        }

        index.mark_cleanup(now);
        outcome
    }

    /// Delete every entry older than the configured maximum age, regardless
    /// of cache pressure. Returns the number of entries removed.
    #[instrument(skip_all)]
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut index = self.index.write().await;

        let mut removed = 0;
        for entry in index.lru_order() {
            if self.is_expired(&entry, now) && self.delete_file(&entry).await {
                index.remove(&entry.key);
                removed += 1;
            }
        }

        index.mark_cleanup(now);
        index.persist(&self.index_path).await?;
        info!(removed, remaining = index.len(), "expired entries swept");
        Ok(removed)
    }

    /// Diagnostics snapshot. O(n) over the index.
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.read().await;
        CacheStats {
            entry_count: index.len(),
            total_size_bytes: index.total_size_bytes(),
            oldest_created_at: index.entries().map(|e| e.created_at).min(),
            newest_created_at: index.entries().map(|e| e.created_at).max(),
            last_cleanup_at: index.last_cleanup_at(),
        }
    }

    /// Delete every data file and reset the index. Idempotent.
    #[instrument(skip_all)]
    pub async fn clear(&self) -> Result<()> {
        let mut index = self.index.write().await;

        for entry in index.entries() {
            self.delete_file(entry).await;
        }
        self.remove_partials().await;

        let removed = index.len();
        index.clear();
        index.persist(&self.index_path).await?;
        info!(removed, "asset cache cleared");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(entry.created_at);
        age.to_std().is_ok_and(|age| age > self.settings.max_age)
    }

    /// Remove an entry's data file. A file that is already gone counts as deleted.
    async fn delete_file(&self, entry: &CacheEntry) -> bool {
        let path = self.path_for(entry);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = ?path, error = %e, "failed to delete cached file, skipping");
                false
            }
        }
    }

    /// Remove leftovers of interrupted writes.
    async fn remove_partials(&self) {
        let Ok(mut dir) = tokio::fs::read_dir(&self.settings.dir).await else {
            return;
        };
        while let Ok(Some(item)) = dir.next_entry().await {
            let name = item.file_name();
            if name.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                let _ = tokio::fs::remove_file(item.path()).await;
            }
        }
    }

    async fn persist_logged(&self, index: &CacheIndex) {
        if let Err(e) = index.persist(&self.index_path).await {
            warn!(error = %e, "failed to persist cache index");
        }
    }
}
