//! Append-only memory persisted through the storage port.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::{Result, ScribeError};
use crate::ports::KeyValueStore;
use crate::types::MemoryItem;

/// The memory list of one agent client, mirrored to a storage key.
///
/// Storage failures never propagate: a failed load starts empty and a failed
/// write is logged and dropped.
pub struct MemoryBook {
    store: Arc<dyn KeyValueStore>,
    key: String,
    items: RwLock<Vec<MemoryItem>>,
}

impl MemoryBook {
    /// Load the list stored under `key`, or start empty.
    pub fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let items = match read_items(store.as_ref(), &key) {
            Ok(items) => {
                debug!(key = %key, count = items.len(), "memory loaded");
                items
            }
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable memory");
                Vec::new()
            }
        };
        Self {
            store,
            key,
            items: RwLock::new(items),
        }
    }

    /// Append one item and persist the whole list.
    pub fn append(&self, item: MemoryItem) {
        let serialized = {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            items.push(item);
            serde_json::to_string(&*items)
        };

        let written = serialized
            .map_err(ScribeError::from)
            .and_then(|json| self.store.set(&self.key, &json));
        if let Err(e) = written {
            warn!(key = %self.key, error = %e, "failed to persist memory");
        }
    }

    /// Snapshot of all items, oldest first.
    pub fn items(&self) -> Vec<MemoryItem> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_items(store: &dyn KeyValueStore, key: &str) -> Result<Vec<MemoryItem>> {
    match store.get(key)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}
