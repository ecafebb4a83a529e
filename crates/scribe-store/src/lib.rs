//! # scribe-store
//!
//! SQLite persistence for Scribe's key-value storage port.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  SqliteStore (KeyValueStore port)       │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL)                │
//! │  Migrations (versioned, transactional)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use scribe_store::SqliteStore;
//!
//! let store = SqliteStore::open("scribe.db")?;
//! store.set_async("scribe.prefer_free_model", "true").await?;
//! ```

pub mod db;
pub mod error;
pub mod kv;
pub mod migration;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use kv::SqliteStore;
