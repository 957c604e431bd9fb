//! Persistent cache for LLM-generated summaries, keyed by content hash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, warn};

use crate::types::RagError;

/// SHA-256 hex digest of the text, used as the cache key so identical
/// statements repeated across documents summarize once.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Key-value store for summaries. `flush` persists whatever backing the
/// implementation has; the in-memory double makes it a no-op.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: String, value: String);
    async fn flush(&self) -> Result<(), RagError>;
    async fn clear(&self) -> Result<(), RagError>;
}

/// JSON-file cache: one flat object mapping hash to summary, rewritten in
/// full on flush. A missing or corrupt file is an empty cache.
pub struct JsonFileCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<(), RagError> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(&self.path).await?;
        match serde_json::from_str::<HashMap<String, String>>(&data) {
            Ok(parsed) => {
                info!(entries = parsed.len(), "loaded summary cache");
                *self.entries.write() = parsed;
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "corrupt summary cache, starting fresh");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SummaryStore for JsonFileCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    async fn set(&self, key: String, value: String) {
        self.entries.write().insert(key, value);
    }

    async fn flush(&self) -> Result<(), RagError> {
        let serialized = {
            let entries = self.entries.read();
            serde_json::to_string(&*entries)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, serialized).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), RagError> {
        self.entries.write().clear();
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

/// In-memory cache for tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SummaryStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    async fn set(&self, key: String, value: String) {
        self.entries.write().insert(key, value);
    }

    async fn flush(&self) -> Result<(), RagError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), RagError> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hashes_are_stable_hex() {
        let a = content_hash("the same text");
        let b = content_hash("the same text");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("different text"));
    }

    #[tokio::test]
    async fn file_cache_round_trips_through_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries.json");

        let cache = JsonFileCache::new(&path);
        cache.load().await.unwrap();
        cache.set("abc".into(), "a summary".into()).await;
        cache.flush().await.unwrap();

        let reloaded = JsonFileCache::new(&path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get("abc").await.as_deref(), Some("a summary"));
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries.json");
        tokio::fs::write(&path, "[1, 2").await.unwrap();

        let cache = JsonFileCache::new(&path);
        cache.load().await.unwrap();
        assert!(cache.get("anything").await.is_none());
    }
}
