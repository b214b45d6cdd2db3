//! Item Store
//!
//! Key-value storage for list items. Values are the JSON encoding of an
//! [`Item`], keyed by the layout described on [`Scope`].
//!
//! - **types**: `Item` and `Scope`
//! - **memory**: in-process `MemoryStore` with JSON snapshots
//! - **error**: error types
//!
//! The store is the source of truth for list contents; the WebSocket hub
//! only tells clients that something changed.

pub mod error;
pub mod memory;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, SnapshotEntry};
pub use types::{Item, Scope, DEFAULT_NAMESPACE, GLOBAL_PREFIX, KEY_ROOT, PERSONAL_PREFIX};

use async_trait::async_trait;

/// Key-value backend for items
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch the raw value stored under `key`
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: String) -> StoreResult<()>;

    /// Remove `key`; returns whether it existed
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All `(key, value)` pairs whose key starts with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>>;
}

/// Load and decode the item under `key`
pub async fn load_item(store: &dyn ItemStore, key: &str) -> StoreResult<Option<Item>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store `item` under `key`
pub async fn save_item(store: &dyn ItemStore, key: &str, item: &Item) -> StoreResult<()> {
    let raw = serde_json::to_string(item)?;
    store.set(key, raw).await
}

/// Every item of a list. Values that fail to decode are skipped.
pub async fn list_items(store: &dyn ItemStore, scope: &Scope) -> StoreResult<Vec<Item>> {
    let entries = store.scan_prefix(&scope.key_prefix()).await?;

    let items = entries
        .into_iter()
        .filter_map(|(key, raw)| match serde_json::from_str::<Item>(&raw) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping undecodable item");
                None
            }
        })
        .collect();

    Ok(items)
}
