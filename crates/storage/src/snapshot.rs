//! Cache snapshots of the local document store
//!
//! A snapshot is a serialized copy of one language's deities and stotras,
//! kept in the key-value store under `snapshot:<lang>`. Restoring it rebuilds
//! the local tables without a network round-trip.
//!
//! Snapshots never expire on their own. A snapshot is only usable when its
//! format version matches the store's and its language tag matches the
//! request; anything else reads as absent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{
    ContentCounts, ContentError, ContentStore, Deity, DeityRecord, Stotra, StotraRecord,
};
use crate::kv::{KvError, KvStore};
use crate::language::Language;

/// Current snapshot format version
pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0";

const KEY_PREFIX: &str = "snapshot";

/// Snapshot error types
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Key-value store error
    #[error("KV store error: {0}")]
    Kv(#[from] KvError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot belongs to another language
    #[error("Snapshot is for {found}, expected {expected}")]
    LanguageMismatch {
        /// Language requested
        expected: Language,
        /// Language recorded in the snapshot
        found: Language,
    },

    /// Restoring into the document store failed
    #[error("Content store error: {0}")]
    Content(#[from] ContentError),
}

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Point-in-time copy of one language's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Language of the captured rows
    pub language: Language,
    /// Capture time, epoch millis
    pub timestamp: i64,
    /// Format version tag
    pub version: String,
    /// Captured deities
    pub deities: Vec<DeityRecord>,
    /// Captured stotras
    pub stotras: Vec<StotraRecord>,
}

impl CacheSnapshot {
    /// Total number of captured records
    pub fn item_count(&self) -> usize {
        self.deities.len() + self.stotras.len()
    }
}

/// Size information for a stored snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotStats {
    /// Serialized size in bytes
    pub size_bytes: usize,
    /// Deities plus stotras
    pub item_count: usize,
    /// Capture time, epoch millis (0 when absent)
    pub last_updated: i64,
}

/// Per-language snapshot storage
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    kv: KvStore,
    content: ContentStore,
    format_version: String,
}

impl SnapshotStore {
    /// Create a snapshot store writing to `kv` and restoring into `content`
    pub fn new(kv: KvStore, content: ContentStore) -> Self {
        Self { kv, content, format_version: SNAPSHOT_FORMAT_VERSION.to_string() }
    }

    /// Override the expected format version
    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = version.into();
        self
    }

    /// Format version this store writes and accepts
    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    fn key(language: Language) -> String {
        KvStore::scoped_key(&[KEY_PREFIX, language.as_str()])
    }

    /// Load the snapshot for a language, if a usable one exists
    pub fn load(&self, language: Language) -> Result<Option<CacheSnapshot>> {
        let snapshot: CacheSnapshot = match self.kv.get(&Self::key(language)) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(KvError::Serialization(e)) => {
                tracing::warn!("Discarding unreadable {} snapshot: {}", language, e);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if snapshot.version != self.format_version {
            tracing::debug!(
                "Ignoring {} snapshot with version {} (expected {})",
                language,
                snapshot.version,
                self.format_version
            );
            return Ok(None);
        }
        if snapshot.language != language {
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    /// Whether a usable snapshot exists for a language
    pub fn is_valid(&self, language: Language) -> Result<bool> {
        let valid = self.load(language)?.is_some();
        tracing::debug!("Snapshot valid for {}: {}", language, valid);
        Ok(valid)
    }

    /// Capture rows as the snapshot for a language, replacing any previous one
    pub fn save(&self, language: Language, deities: &[Deity], stotras: &[Stotra]) -> Result<()> {
        let snapshot = CacheSnapshot {
            language,
            timestamp: chrono::Utc::now().timestamp_millis(),
            version: self.format_version.clone(),
            deities: deities.iter().map(DeityRecord::from).collect(),
            stotras: stotras.iter().map(StotraRecord::from).collect(),
        };

        self.kv.set(&Self::key(language), &snapshot)?;
        tracing::info!(
            "Saved {} snapshot with {} deities and {} stotras",
            language,
            snapshot.deities.len(),
            snapshot.stotras.len()
        );
        Ok(())
    }

    /// Replace a language's local rows with the snapshot contents
    pub async fn restore(
        &self,
        snapshot: &CacheSnapshot,
        language: Language,
    ) -> Result<ContentCounts> {
        if snapshot.language != language {
            return Err(SnapshotError::LanguageMismatch {
                expected: language,
                found: snapshot.language,
            });
        }

        let mut tx = self.content.begin_write().await?;
        tx.delete_all(language).await?;
        for deity in &snapshot.deities {
            tx.insert_deity(language, deity).await?;
        }
        for stotra in &snapshot.stotras {
            tx.insert_stotra(language, stotra).await?;
        }
        tx.commit().await?;

        tracing::info!(
            "Restored {} snapshot: {} deities, {} stotras",
            language,
            snapshot.deities.len(),
            snapshot.stotras.len()
        );
        Ok(ContentCounts { deities: snapshot.deities.len(), stotras: snapshot.stotras.len() })
    }

    /// Delete every language's snapshot
    pub fn clear(&self) -> Result<usize> {
        let removed = self.kv.remove_prefix(&format!("{}:", KEY_PREFIX))?;
        tracing::info!("Cleared {} snapshots", removed);
        Ok(removed)
    }

    /// Delete one language's snapshot
    pub fn clear_language(&self, language: Language) -> Result<bool> {
        let removed = self.kv.remove(&Self::key(language))?;
        if removed {
            tracing::info!("Cleared {} snapshot", language);
        }
        Ok(removed)
    }

    /// Patch the favorite flag of one cached stotra in place
    ///
    /// Returns `false` when there is no usable snapshot or the stotra is not in it.
    pub fn update_favorite(
        &self,
        stotra_id: &str,
        is_favorite: bool,
        language: Language,
    ) -> Result<bool> {
        let Some(mut snapshot) = self.load(language)? else {
            return Ok(false);
        };

        let Some(stotra) = snapshot.stotras.iter_mut().find(|s| s.stotra_id == stotra_id) else {
            return Ok(false);
        };
        stotra.is_favorite = is_favorite;

        self.kv.set(&Self::key(language), &snapshot)?;
        tracing::debug!("Snapshot favorite for {} set to {}", stotra_id, is_favorite);
        Ok(true)
    }

    /// Size information for a language's snapshot
    pub fn stats(&self, language: Language) -> Result<SnapshotStats> {
        match self.load(language)? {
            Some(snapshot) => Ok(SnapshotStats {
                size_bytes: serde_json::to_vec(&snapshot)?.len(),
                item_count: snapshot.item_count(),
                last_updated: snapshot.timestamp,
            }),
            None => Ok(SnapshotStats::default()),
        }
    }
}
