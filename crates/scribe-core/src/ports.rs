//! Ports to the collaborators the core does not own.
//!
//! - [`KeyValueStore`] -- string key-value persistence (memory, flags).
//! - [`DocumentSink`] -- the "write text to document" side channel.
//! - [`ChatListener`] -- per-turn callbacks delivering [`ChatMessage`]s.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::Result;
use crate::types::ChatMessage;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Key-value persistence supplied by the environment.
///
/// Read-modify-write without cross-process locking: concurrent writers may
/// lose updates.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.  `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (or overwrite) a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store, used by tests and as the default port.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Document sink
// ---------------------------------------------------------------------------

/// Presentation hints passed along with every sink write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Append to the current document instead of replacing the selection.
    pub append: bool,
    /// Animate the text as if typed.
    pub typing: bool,
    /// Milliseconds per character when `typing` is set.
    pub typing_speed: u32,
    /// Highlight the inserted text.
    pub highlight: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            append: true,
            typing: false,
            typing_speed: 10,
            highlight: false,
        }
    }
}

/// Fire-and-forget text output into the caller's document.
///
/// The returned flag is logged by the core, never acted upon.
pub trait DocumentSink: Send + Sync {
    fn write(&self, text: &str, options: &WriteOptions) -> bool;
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DocumentSink for NullSink {
    fn write(&self, _text: &str, _options: &WriteOptions) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Receives the incremental output of one chat turn.
///
/// Every `chat` call delivers exactly one `on_start` / `on_stop` pair, with
/// zero or more `on_message` calls in between.
pub trait ChatListener: Send + Sync {
    /// The turn has begun.
    fn on_start(&self) {}

    /// A message of the turn.  The last one has `status == Final`.
    fn on_message(&self, message: ChatMessage);

    /// The turn has ended (success, error, or cancellation).
    fn on_stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.get("k").unwrap().is_none());

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn write_options_default_appends() {
        let options = WriteOptions::default();
        assert!(options.append);
        assert!(!options.highlight);
        assert!(NullSink.write("text", &options));
    }
}
