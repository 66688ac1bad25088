use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::CacheEntry;

/// Namespace holding every cached answer (no trailing slash, cnidarium convention).
pub const CACHE_PREFIX: &str = "cache_v2";

fn entry_key(key: &str) -> String {
    format!("{}/{}", CACHE_PREFIX, key)
}

/// Backing storage for the response cache. Only the cache actor calls this.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>>;
    async fn save(&self, key: &str, entry: &CacheEntry) -> Result<()>;
    /// Remove every entry, returning how many were removed.
    async fn clear(&self) -> Result<usize>;
}

/// Non-durable store for tests and `--memory-cache`.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for std::sync::Arc<S> {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        (**self).load(key).await
    }

    async fn save(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        (**self).save(key, entry).await
    }

    async fn clear(&self) -> Result<usize> {
        (**self).clear().await
    }
}

/// Durable store: one cnidarium key per fingerprint under `cache_v2/`.
pub struct CnidariumStore {
    storage: Storage,
}

impl CnidariumStore {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create cache dir {:?}", data_dir))?;
        let storage = Storage::load(data_dir.to_path_buf(), vec![CACHE_PREFIX.to_string()])
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self { storage })
    }
}

#[async_trait]
impl CacheStore for CnidariumStore {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(&entry_key(key)).await? else {
            return Ok(None);
        };
        let entry = serde_json::from_slice(&bytes).context("deserialize cache entry")?;
        Ok(Some(entry))
    }

    async fn save(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(
            entry_key(key),
            serde_json::to_vec(entry).context("serialize cache entry")?,
        );
        self.storage.commit(delta).await?;
        debug!(key, "cache entry stored");
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let snapshot = self.storage.latest_snapshot();
        let mut keys = Vec::new();
        {
            let mut stream = snapshot.prefix_raw(CACHE_PREFIX);
            while let Some(entry) = stream.next().await {
                match entry {
                    Ok((key, _)) => keys.push(key),
                    Err(e) => warn!("Error reading cache stream: {}", e),
                }
            }
        }

        let mut delta = StateDelta::new(snapshot);
        for key in &keys {
            delta.delete(key.clone());
        }
        self.storage.commit(delta).await?;
        debug!(removed = keys.len(), "cache cleared");
        Ok(keys.len())
    }
}
