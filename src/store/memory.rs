//! In-memory item store
//!
//! A sorted map behind a tokio `RwLock`. Optionally loaded from and saved to
//! a JSON snapshot file of the form
//!
//! ```json
//! [{"key": "item:g:default:123", "value": "{\"uid\":\"123\",...}"}]
//! ```
//!
//! Snapshots are best effort: written on graceful shutdown only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

use super::error::StoreResult;
use super::ItemStore;

/// One key/value pair of a snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub value: String,
}

/// Item store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from snapshot entries
    pub fn from_entries(entries: impl IntoIterator<Item = SnapshotEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Load a snapshot file; a missing file yields an empty store
    pub async fn load_snapshot(path: &Path) -> StoreResult<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No snapshot at {:?}, starting empty", path);
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<SnapshotEntry> = serde_json::from_str(&content)?;
        tracing::info!("Loaded {} keys from snapshot {:?}", entries.len(), path);
        Ok(Self::from_entries(entries))
    }

    /// Current contents as snapshot entries, in key order
    pub async fn entries(&self) -> Vec<SnapshotEntry> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, value)| SnapshotEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// Write the current contents to `path`.
    ///
    /// Written to a sibling temp file first, then renamed over `path`.
    pub async fn save_snapshot(&self, path: &Path) -> StoreResult<usize> {
        let entries = self.entries().await;
        let content = serde_json::to_string(&entries)?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::info!("Saved {} keys to snapshot {:?}", entries.len(), path);
        Ok(entries.len())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let entries = self.entries.read().await;
        let matches = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(matches)
    }
}
