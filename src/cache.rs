//! Filesystem-backed response cache.
//!
//! One JSON file per entry, keyed by a sha256 digest of the normalized query
//! plus its options. Entries carry a write timestamp; an expired entry reads
//! as a miss and is lazily removed. Cache errors never fail a request — they
//! are logged and demoted to a miss or no-op.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::types::{PipelineResult, QueryOptions};

/// Cache statistics reported to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub directory: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    cached_at: DateTime<Utc>,
    result: PipelineResult,
}

/// Cache manager for pipeline responses.
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    root: PathBuf,
}

impl ResponseCache {
    pub fn new(enabled: bool, ttl: Duration, directory: impl Into<PathBuf>) -> Self {
        let root = directory.into();
        if enabled {
            if let Err(err) = std::fs::create_dir_all(&root) {
                warn!(dir = %root.display(), error = %err, "failed to create cache directory");
            }
        }
        info!(
            enabled,
            ttl_secs = ttl.as_secs(),
            dir = %root.display(),
            "response cache initialized"
        );
        Self { enabled, ttl, root }
    }

    /// Deterministic key for a `(query, options)` pair.
    ///
    /// The query is lowercased and trimmed; the canonical JSON encoding sorts
    /// object keys so equal inputs always hash identically.
    pub fn cache_key(query: &str, options: &QueryOptions) -> String {
        let mut input = BTreeMap::new();
        input.insert(
            "options",
            serde_json::to_value(options).unwrap_or(serde_json::Value::Null),
        );
        input.insert(
            "query",
            serde_json::Value::String(query.trim().to_lowercase()),
        );

        let canonical = canonical_string(&serde_json::to_value(&input).unwrap_or_default());
        let digest = Sha256::digest(canonical.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        format!("query:{}", hex)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let file = key.strip_prefix("query:").unwrap_or(key);
        self.root.join(format!("{}.json", file))
    }

    /// Look up a fresh cached result. Expired or unreadable entries are
    /// misses.
    pub async fn get(&self, query: &str, options: &QueryOptions) -> Option<PipelineResult> {
        if !self.enabled {
            return None;
        }

        let key = Self::cache_key(query, options);
        let path = self.entry_path(&key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!(%key, "cache miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%key, error = %err, "unreadable cache entry, treating as miss");
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(entry.cached_at);
        if age.num_seconds() < 0 || age.num_seconds() as u64 > self.ttl.as_secs() {
            debug!(%key, "cache entry expired");
            let _ = fs::remove_file(&path).await;
            return None;
        }

        debug!(%key, "cache hit");
        Some(entry.result)
    }

    /// Store a result. The stored copy is stamped with `cache_hit = false`
    /// and the write time; the caller's value is not mutated.
    pub async fn set(&self, query: &str, options: &QueryOptions, result: &PipelineResult) {
        if !self.enabled {
            return;
        }

        let cached_at = Utc::now();
        let mut stored = result.clone();
        stored.metadata.cache_hit = false;
        stored.metadata.cached_at = Some(cached_at.to_rfc3339());

        let key = Self::cache_key(query, options);
        let entry = CacheEntry {
            cached_at,
            result: stored,
        };

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%key, error = %err, "failed to serialize cache entry");
                return;
            }
        };
        if let Err(err) = fs::write(self.entry_path(&key), bytes).await {
            warn!(%key, error = %err, "cache write failed");
        }
    }

    /// Remove the entry for one `(query, options)` pair.
    pub async fn delete(&self, query: &str, options: &QueryOptions) {
        let key = Self::cache_key(query, options);
        if let Err(err) = fs::remove_file(self.entry_path(&key)).await {
            debug!(%key, error = %err, "cache delete was a no-op");
        }
    }

    /// Remove every cached response.
    pub async fn clear(&self) {
        for path in self.entry_files().await {
            if let Err(err) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %err, "cache clear failed for entry");
            }
        }
        info!("cache cleared");
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entry_files().await.len(),
            enabled: self.enabled,
            ttl_seconds: self.ttl.as_secs(),
            directory: self.root.display().to_string(),
        }
    }

    async fn entry_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(mut dir) = fs::read_dir(&self.root).await else {
            return files;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("root", &self.root)
            .finish()
    }
}

/// Encode a JSON value with object keys sorted, so structurally equal values
/// produce byte-identical encodings.
fn canonical_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, String> = map
                .iter()
                .map(|(k, v)| (k, canonical_string(v)))
                .collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let encoded: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", encoded.join(","))
        }
        other => other.to_string(),
    }
}
