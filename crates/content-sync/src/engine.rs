//! Sync engine
//!
//! Keeps the local document store in step with the remote content source.
//! Three entry points do the work:
//!
//! - [`SyncEngine::initial_download`] restores a language from its cache
//!   snapshot, or replaces its rows with a full remote fetch
//! - [`SyncEngine::sync_new_content`] upserts stotras changed since the
//!   current language's watermark, one transaction per record
//! - [`SyncEngine::check_for_updates`] counts pending changes without writing
//!
//! Writers share a single-flight guard: a second writer fails fast with
//! [`SyncError::InProgress`] instead of queueing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use storage::{ContentError, Language, SnapshotError, StorageContext};
use tokio::sync::{broadcast, Mutex, MutexGuard, RwLock};

use crate::remote::{RemoteContentSource, RemoteError, RemoteStotra};

/// Errors that can occur during sync operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Remote content source failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local document store failed
    #[error("Content store error: {0}")]
    Content(#[from] ContentError),

    /// Snapshot store failed
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Another download, sync or language switch is running
    #[error("A sync operation is already in progress")]
    InProgress,

    /// Incremental sync needs a selected language
    #[error("No language selected")]
    NoLanguageSelected,

    /// Network is known to be unavailable
    #[error("Network is offline")]
    Offline,

    /// Operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Background task ended without a result
    #[error("Sync task interrupted: {0}")]
    Interrupted(String),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// What happens to cache snapshots when the language changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotInvalidation {
    /// Clear every language's snapshot
    AllLanguages,
    /// Keep snapshots, so switching back restores without a fetch
    #[default]
    None,
}

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long first-run setup waits for the download
    pub first_run_timeout: Duration,
    /// Snapshot handling on language switch
    pub snapshot_invalidation: SnapshotInvalidation,
    /// Minimum spacing between background syncs
    pub auto_sync_interval: Duration,
    /// Event channel buffer size
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            first_run_timeout: Duration::from_secs(30),
            snapshot_invalidation: SnapshotInvalidation::default(),
            auto_sync_interval: Duration::from_secs(7 * 24 * 60 * 60),
            event_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first-run download timeout
    pub fn first_run_timeout(mut self, timeout: Duration) -> Self {
        self.first_run_timeout = timeout;
        self
    }

    /// Set the snapshot invalidation policy
    pub fn snapshot_invalidation(mut self, policy: SnapshotInvalidation) -> Self {
        self.snapshot_invalidation = policy;
        self
    }

    /// Set the background sync interval
    pub fn auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = interval;
        self
    }

    /// Set the event channel buffer size
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Network connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkState {
    /// Connected to network
    Online,
    /// Disconnected from network
    Offline,
    /// Network state unknown
    #[default]
    Unknown,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkState::Online => write!(f, "online"),
            NetworkState::Offline => write!(f, "offline"),
            NetworkState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Engine entry point that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    /// Snapshot restore or full refetch
    InitialDownload,
    /// Watermark-bounded upsert
    IncrementalSync,
    /// Language change followed by a download
    LanguageSwitch,
}

/// Events published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Coarse progress milestone; advisory only
    Progress {
        /// Running operation
        operation: SyncOperation,
        /// Percentage, 0 to 100
        percent: u8,
    },
    /// Operation finished successfully
    Completed {
        /// Finished operation
        operation: SyncOperation,
    },
    /// Operation failed
    Failed {
        /// Failed operation
        operation: SyncOperation,
        /// Error description
        message: String,
    },
    /// Network state changed
    NetworkStateChanged {
        /// New state
        state: NetworkState,
    },
}

/// Where a download's rows came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSource {
    /// Restored from the language's cache snapshot
    Snapshot,
    /// Fetched from the remote content source
    Remote,
}

/// Result of an initial download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Downloaded language
    pub language: Language,
    /// Origin of the rows
    pub source: DownloadSource,
    /// Deities now stored
    pub deities: usize,
    /// Stotras now stored
    pub stotras: usize,
    /// Remote records dropped for a missing identifier or parent deity
    pub skipped: usize,
}

/// Result of an incremental sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    /// Stotras created or updated
    pub updated: usize,
    /// Stotras whose upsert failed
    pub errors: usize,
    /// Stotras dropped because their deity is not stored locally
    pub skipped: usize,
}

/// Result of an update check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateCheck {
    /// Whether newer stotras exist remotely
    pub has_updates: bool,
    /// Number of newer stotras
    pub update_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Updated,
    Created,
    MissingDeity,
}

struct EngineInner {
    storage: StorageContext,
    remote: Arc<dyn RemoteContentSource>,
    config: SyncConfig,
    guard: Mutex<()>,
    network_state: RwLock<NetworkState>,
    events: broadcast::Sender<SyncEvent>,
}

/// Coordinates the remote source, document store, snapshots and preferences
///
/// Cloning is cheap; clones share state, including the single-flight guard.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine").field("config", &self.inner.config).finish_non_exhaustive()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SyncEngine {
    /// Create an engine over explicit stores and a remote source
    pub fn new(
        storage: StorageContext,
        remote: Arc<dyn RemoteContentSource>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(EngineInner {
                storage,
                remote,
                config,
                guard: Mutex::new(()),
                network_state: RwLock::new(NetworkState::Unknown),
                events,
            }),
        }
    }

    /// Local stores
    pub fn storage(&self) -> &StorageContext {
        &self.inner.storage
    }

    /// Engine configuration
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Subscribe to progress and lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Current network state
    pub async fn network_state(&self) -> NetworkState {
        *self.inner.network_state.read().await
    }

    /// Update the network state; offline engines refuse remote work
    pub async fn set_network_state(&self, state: NetworkState) {
        let mut current = self.inner.network_state.write().await;
        if *current != state {
            *current = state;
            tracing::info!("Network state changed to {}", state);
            self.emit(SyncEvent::NetworkStateChanged { state });
        }
    }

    /// Whether a download, sync or language switch is running
    pub fn is_busy(&self) -> bool {
        self.inner.guard.try_lock().is_err()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.inner.events.send(event);
    }

    fn progress(&self, operation: SyncOperation, percent: u8) {
        self.emit(SyncEvent::Progress { operation, percent });
    }

    pub(crate) fn try_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.inner.guard.try_lock().map_err(|_| SyncError::InProgress)
    }

    pub(crate) fn finish<T>(&self, operation: SyncOperation, result: &Result<T>) {
        match result {
            Ok(_) => self.emit(SyncEvent::Completed { operation }),
            Err(e) => {
                tracing::error!("{:?} failed: {}", operation, e);
                self.emit(SyncEvent::Failed { operation, message: e.to_string() });
            }
        }
    }

    async fn ensure_online(&self) -> Result<()> {
        if self.network_state().await == NetworkState::Offline {
            return Err(SyncError::Offline);
        }
        Ok(())
    }

    /// Make `language`'s local rows available
    ///
    /// Restores from a valid snapshot without touching the network; otherwise
    /// fetches both collections and replaces the language's rows in one
    /// transaction, then snapshots the result and advances the watermark.
    pub async fn initial_download(&self, language: Language) -> Result<DownloadReport> {
        let _guard = self.try_guard()?;
        let result = self.download_locked(language, SyncOperation::InitialDownload).await;
        self.finish(SyncOperation::InitialDownload, &result);
        result
    }

    pub(crate) async fn download_locked(
        &self,
        language: Language,
        operation: SyncOperation,
    ) -> Result<DownloadReport> {
        if let Some(report) = self.restore_snapshot(language).await {
            self.progress(operation, 100);
            return Ok(report);
        }

        self.ensure_online().await?;
        tracing::info!("Starting full download for {}", language);
        self.progress(operation, 10);

        let remote_deities = self.inner.remote.fetch_deities(language).await?;
        tracing::info!("Fetched {} deities", remote_deities.len());
        self.progress(operation, 30);

        let remote_stotras = self.inner.remote.fetch_stotras(language).await?;
        tracing::info!("Fetched {} stotras", remote_stotras.len());
        self.progress(operation, 50);

        let now = now_millis();
        let content = &self.inner.storage.content;
        let mut skipped = 0;

        let mut tx = content.begin_write().await?;
        let favorites = tx.favorite_ids(language).await?;
        tx.delete_all(language).await?;
        self.progress(operation, 60);

        let mut known_deities = HashSet::new();
        for deity in &remote_deities {
            if deity.deity_id.trim().is_empty() {
                tracing::warn!("Skipping deity without deity_id");
                skipped += 1;
                continue;
            }
            tx.insert_deity(language, &deity.to_record(language)).await?;
            known_deities.insert(deity.deity_id.as_str());
        }
        self.progress(operation, 80);

        for stotra in &remote_stotras {
            let orphan = !known_deities.contains(stotra.deity_id.as_str());
            if stotra.stotra_id.trim().is_empty() || orphan {
                tracing::warn!(
                    "Skipping stotra {:?}: deity {:?} not downloaded",
                    stotra.stotra_id,
                    stotra.deity_id
                );
                skipped += 1;
                continue;
            }
            let mut record = stotra.to_record(language, now);
            record.is_favorite = favorites.contains(&record.stotra_id);
            tx.insert_stotra(language, &record).await?;
        }
        tx.commit().await?;

        let deities = content.deities(language).await?;
        let stotras = content.stotras(language).await?;
        if let Err(e) = self.inner.storage.snapshots.save(language, &deities, &stotras) {
            tracing::warn!("Failed to save {} snapshot: {}", language, e);
        }

        let prefs = &self.inner.storage.preferences;
        prefs.set_last_sync_timestamp(prefs.last_sync_timestamp().max(now));
        prefs.set_sync_stats(deities.len(), stotras.len());
        prefs.set_content_version(language, now);
        self.progress(operation, 100);

        tracing::info!(
            "Full download for {} complete: {} deities, {} stotras, {} skipped",
            language,
            deities.len(),
            stotras.len(),
            skipped
        );

        Ok(DownloadReport {
            language,
            source: DownloadSource::Remote,
            deities: deities.len(),
            stotras: stotras.len(),
            skipped,
        })
    }

    async fn restore_snapshot(&self, language: Language) -> Option<DownloadReport> {
        let snapshots = &self.inner.storage.snapshots;

        let snapshot = match snapshots.load(language) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Could not read {} snapshot: {}", language, e);
                return None;
            }
        };

        match snapshots.restore(&snapshot, language).await {
            Ok(counts) => {
                // Rows are only as fresh as the snapshot
                let prefs = &self.inner.storage.preferences;
                if prefs.content_version(language) > snapshot.timestamp {
                    prefs.set_content_version(language, snapshot.timestamp);
                }

                Some(DownloadReport {
                    language,
                    source: DownloadSource::Snapshot,
                    deities: counts.deities,
                    stotras: counts.stotras,
                    skipped: 0,
                })
            }
            Err(e) => {
                tracing::warn!("Snapshot restore for {} failed, fetching instead: {}", language, e);
                None
            }
        }
    }

    /// Upsert stotras changed since the current language's watermark
    ///
    /// Each record is applied in its own transaction; a failing record is
    /// counted in `errors` and does not stop the rest. The watermark advances
    /// once the batch has been processed.
    pub async fn sync_new_content(&self) -> Result<SyncOutcome> {
        let _guard = self.try_guard()?;
        let result = self.sync_locked().await;
        self.finish(SyncOperation::IncrementalSync, &result);
        result
    }

    async fn sync_locked(&self) -> Result<SyncOutcome> {
        let operation = SyncOperation::IncrementalSync;
        let prefs = &self.inner.storage.preferences;
        let language = prefs.current_language().ok_or(SyncError::NoLanguageSelected)?;
        self.ensure_online().await?;

        let since = prefs.content_version(language);
        tracing::info!("Starting incremental sync for {} since {}", language, since);
        self.progress(operation, 20);

        let records = self.inner.remote.fetch_stotras_since(language, since).await?;
        tracing::info!("Found {} updated stotras", records.len());
        self.progress(operation, 50);

        let now = now_millis();
        let mut outcome = SyncOutcome::default();
        for record in &records {
            match self.upsert_stotra(language, record, now).await {
                Ok(Upsert::Updated | Upsert::Created) => outcome.updated += 1,
                Ok(Upsert::MissingDeity) => {
                    tracing::warn!(
                        "Skipping stotra {}: deity {} not stored locally",
                        record.stotra_id,
                        record.deity_id
                    );
                    outcome.skipped += 1;
                }
                Err(e) => {
                    tracing::error!("Error syncing stotra {}: {}", record.stotra_id, e);
                    outcome.errors += 1;
                }
            }
        }
        self.progress(operation, 90);

        prefs.set_content_version(language, since.max(now));
        prefs.set_last_sync_timestamp(prefs.last_sync_timestamp().max(now));
        if outcome.updated > 0 {
            self.refresh_snapshot(language).await;
        }
        self.progress(operation, 100);

        tracing::info!(
            "Incremental sync complete: {} updated, {} errors, {} skipped",
            outcome.updated,
            outcome.errors,
            outcome.skipped
        );
        Ok(outcome)
    }

    async fn upsert_stotra(
        &self,
        language: Language,
        remote: &RemoteStotra,
        now: i64,
    ) -> std::result::Result<Upsert, ContentError> {
        let record = remote.to_record(language, now);
        let mut tx = self.inner.storage.content.begin_write().await?;

        let result = if tx.find_stotra(language, &record.stotra_id).await?.is_some() {
            tx.update_stotra_content(language, &record).await?;
            Upsert::Updated
        } else if tx.find_deity(language, &record.deity_id).await?.is_some() {
            tx.insert_stotra(language, &record).await?;
            Upsert::Created
        } else {
            Upsert::MissingDeity
        };

        tx.commit().await?;
        Ok(result)
    }

    /// Re-capture a language's snapshot so it does not lag behind the rows
    async fn refresh_snapshot(&self, language: Language) {
        let content = &self.inner.storage.content;
        let rows = async {
            let deities = content.deities(language).await?;
            let stotras = content.stotras(language).await?;
            Ok::<_, ContentError>((deities, stotras))
        };

        match rows.await {
            Ok((deities, stotras)) => {
                if let Err(e) = self.inner.storage.snapshots.save(language, &deities, &stotras) {
                    tracing::warn!("Failed to refresh {} snapshot: {}", language, e);
                }
            }
            Err(e) => tracing::warn!("Failed to read rows for {} snapshot: {}", language, e),
        }
    }

    /// Count stotras changed since the current language's watermark, without writing
    ///
    /// Reports no updates when no language is selected, the network is known
    /// to be offline, or the remote query fails.
    pub async fn check_for_updates(&self) -> UpdateCheck {
        let prefs = &self.inner.storage.preferences;
        let Some(language) = prefs.current_language() else {
            return UpdateCheck::default();
        };
        if self.ensure_online().await.is_err() {
            return UpdateCheck::default();
        }

        let since = prefs.content_version(language);
        match self.inner.remote.fetch_stotras_since(language, since).await {
            Ok(records) => {
                UpdateCheck { has_updates: !records.is_empty(), update_count: records.len() }
            }
            Err(e) => {
                tracing::warn!("Update check failed: {}", e);
                UpdateCheck::default()
            }
        }
    }

    /// Remote global watermark, or the current time when unavailable
    pub async fn master_timestamp(&self) -> i64 {
        match self.inner.remote.fetch_master_timestamp().await {
            Ok(Some(timestamp)) => timestamp,
            Ok(None) => now_millis(),
            Err(e) => {
                tracing::warn!("Error fetching master timestamp: {}", e);
                now_millis()
            }
        }
    }

    /// Set a stotra's favorite flag and patch the cached snapshot
    ///
    /// Returns `false` when the stotra is not stored locally.
    pub async fn set_favorite(
        &self,
        language: Language,
        stotra_id: &str,
        is_favorite: bool,
    ) -> Result<bool> {
        let storage = &self.inner.storage;
        let found = storage.content.set_favorite(language, stotra_id, is_favorite).await?;
        if found {
            if let Err(e) = storage.snapshots.update_favorite(stotra_id, is_favorite, language) {
                tracing::warn!("Failed to update snapshot favorite for {}: {}", stotra_id, e);
            }
        }
        Ok(found)
    }

    /// Flip a stotra's favorite flag, returning the new value
    pub async fn toggle_favorite(
        &self,
        language: Language,
        stotra_id: &str,
    ) -> Result<Option<bool>> {
        let Some(stotra) = self.inner.storage.content.find_stotra(language, stotra_id).await? else {
            return Ok(None);
        };

        let flag = !stotra.is_favorite;
        self.set_favorite(language, stotra_id, flag).await?;
        Ok(Some(flag))
    }
}
