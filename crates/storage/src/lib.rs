//! Local storage for Bhakti Vani
//!
//! This crate provides the language-partitioned document store (SQLite),
//! the preference store and cache snapshots (sled), schema migrations,
//! and local search helpers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod content;
pub mod context;
pub mod database;
pub mod kv;
pub mod language;
pub mod preferences;
pub mod schema;
pub mod search;
pub mod snapshot;

pub use content::{
    ContentCounts, ContentError, ContentStore, ContentTransaction, Deity, DeityRecord, Stotra,
    StotraFilter, StotraRecord,
};
pub use context::{StorageConfig, StorageContext, StorageError};
pub use kv::{KvConfig, KvError, KvStore};
pub use language::{Language, UnknownLanguage};
pub use preferences::{FontSize, PreferenceStore, SyncStats, Theme, ThemePalette};
pub use snapshot::{
    CacheSnapshot, SnapshotError, SnapshotStats, SnapshotStore, SNAPSHOT_FORMAT_VERSION,
};
