//! The SQLite store behind the core's storage port, across reopens.

use std::sync::Arc;

use scribe_core::{KeyValueStore, MEMORY_KEY, MemoryBook, MemoryItem};
use scribe_store::SqliteStore;

#[test]
fn memory_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scribe.db");

    let written = {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&path).unwrap());
        let book = MemoryBook::load(store, MEMORY_KEY);
        book.append(MemoryItem::new("likes tea", ["memory"]));
        book.append(MemoryItem::new("Q: hi\nA: hello", ["conversation"]));
        book.items()
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let reloaded = MemoryBook::load(store, MEMORY_KEY);
    assert_eq!(reloaded.items(), written);
}

#[tokio::test]
async fn port_and_async_api_share_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("kv.db")).unwrap();

    store.set("scribe.prefer_free_model", "true").unwrap();

    let value = store.get_async("scribe.prefer_free_model").await.unwrap();
    assert_eq!(value.as_deref(), Some("true"));
}
