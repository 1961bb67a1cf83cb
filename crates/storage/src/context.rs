//! Storage context
//!
//! Bundles the document store, snapshot store and preference store so they
//! can be constructed once and handed to the sync engine explicitly.

use std::path::PathBuf;
use thiserror::Error;

use crate::content::{ContentError, ContentStore};
use crate::database::{DatabaseConfig, DatabaseError, SqliteDatabase};
use crate::kv::{KvConfig, KvError, KvStore};
use crate::preferences::PreferenceStore;
use crate::snapshot::{SnapshotStore, SNAPSHOT_FORMAT_VERSION};

/// Storage initialization errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Data directory could not be created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Content store error
    #[error("Content store error: {0}")]
    Content(#[from] ContentError),

    /// Key-value store error
    #[error("KV store error: {0}")]
    Kv(#[from] KvError),
}

/// Result type for storage initialization
pub type Result<T> = std::result::Result<T, StorageError>;

/// On-disk storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding `content.db` and the `kv` tree
    pub data_dir: PathBuf,
    /// SQLite pool size
    pub max_connections: u32,
    /// Expected snapshot format version
    pub snapshot_format_version: String,
    /// Background flush interval for the `kv` tree (None flushes on close only)
    pub kv_flush_every_ms: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("bhaktivani_data"),
            max_connections: 4,
            snapshot_format_version: SNAPSHOT_FORMAT_VERSION.to_string(),
            kv_flush_every_ms: Some(500),
        }
    }
}

impl StorageConfig {
    /// Create a configuration rooted at a directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Default::default() }
    }

    /// Set SQLite pool size
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the expected snapshot format version
    pub fn snapshot_format_version(mut self, version: impl Into<String>) -> Self {
        self.snapshot_format_version = version.into();
        self
    }

    /// Set the `kv` background flush interval
    pub fn kv_flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.kv_flush_every_ms = ms;
        self
    }
}

/// The three local stores, constructed together
#[derive(Debug, Clone)]
pub struct StorageContext {
    /// Language-partitioned document store
    pub content: ContentStore,
    /// Per-language cache snapshots
    pub snapshots: SnapshotStore,
    /// Settings and sync bookkeeping
    pub preferences: PreferenceStore,
    kv: KvStore,
}

impl StorageContext {
    /// Open on-disk stores, applying pending schema migrations
    pub async fn open(config: StorageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let db_path = config.data_dir.join("content.db");
        let db = SqliteDatabase::new(
            DatabaseConfig::new(db_path.to_string_lossy()).max_connections(config.max_connections),
        )
        .await?;
        let content = ContentStore::open(db).await?;

        let kv_path = config.data_dir.join("kv");
        let kv = KvStore::new(
            KvConfig::new(kv_path.to_string_lossy()).flush_every_ms(config.kv_flush_every_ms),
        )?;

        let context = Self::assemble(content, kv, config.snapshot_format_version).await?;
        tracing::info!("Opened storage at {}", config.data_dir.display());
        Ok(context)
    }

    /// Fresh in-memory stores
    pub async fn in_memory() -> Result<Self> {
        let content = ContentStore::in_memory().await?;
        let kv = KvStore::in_memory()?;
        Self::assemble(content, kv, SNAPSHOT_FORMAT_VERSION.to_string()).await
    }

    async fn assemble(
        content: ContentStore,
        kv: KvStore,
        snapshot_version: String,
    ) -> Result<Self> {
        let preferences = PreferenceStore::new(kv.clone());
        let snapshots =
            SnapshotStore::new(kv.clone(), content.clone()).with_format_version(snapshot_version);

        let version = content.schema_version().await?;
        if preferences.migration_version() != version {
            tracing::info!("Local schema at version {}", version);
            preferences.set_migration_version(version);
        }

        Ok(Self { content, snapshots, preferences, kv })
    }

    /// Flush pending key-value writes and close the database pool
    pub async fn close(&self) -> Result<()> {
        self.kv.flush()?;
        self.content.database().close().await;
        Ok(())
    }
}
