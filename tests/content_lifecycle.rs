//! Content lifecycle integration tests
//!
//! End-to-end tests for first-run setup, incremental sync, favorites,
//! snapshots and persistence across restarts.

use content_sync::test_utils::{fixtures, InMemorySource};
use content_sync::{
    DownloadSource, NetworkState, SetupOutcome, SyncConfig, SyncEngine, SyncError, SyncEvent,
    SyncOperation, SyncOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use storage::{Language, StorageConfig, StorageContext};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn setup(config: SyncConfig) -> (SyncEngine, Arc<InMemorySource>) {
    init_tracing();
    let source = Arc::new(fixtures::sample_source());
    let storage = StorageContext::in_memory().await.unwrap();
    let engine = SyncEngine::new(storage, source.clone(), config);
    (engine, source)
}

/// Millisecond timestamp strictly between the last sync and the next one
async fn edit_timestamp() -> i64 {
    tokio::time::sleep(Duration::from_millis(5)).await;
    let ts = chrono::Utc::now().timestamp_millis();
    tokio::time::sleep(Duration::from_millis(5)).await;
    ts
}

#[tokio::test]
async fn test_first_run_then_incremental_sync() {
    let (engine, source) = setup(SyncConfig::default()).await;

    // Phase 1: first run
    let outcome = engine.initial_setup(Language::Telugu).await;
    let SetupOutcome::Downloaded(report) = outcome else {
        panic!("expected download, got {:?}", outcome);
    };
    assert_eq!(report.source, DownloadSource::Remote);
    assert_eq!((report.deities, report.stotras), (2, 3));
    assert_eq!(source.deity_fetches(), 1);
    assert_eq!(source.stotra_fetches(), 1);
    assert!(engine.storage().snapshots.is_valid(Language::Telugu).unwrap());

    let prefs = &engine.storage().preferences;
    assert!(prefs.is_initial_setup_complete());
    assert_eq!(prefs.current_language(), Some(Language::Telugu));
    let first_watermark = prefs.last_sync_timestamp();
    assert!(first_watermark > 0);

    let check = engine.check_for_updates().await;
    assert!(!check.has_updates);

    // Phase 2: remote edits one stotra and adds another
    let ts = edit_timestamp().await;
    let mut edited = fixtures::stotra("rama-raksha", "rama", ts);
    edited.content = Some("revised verses".to_string());
    source.add_stotra(Language::Telugu, edited);
    source.add_stotra(Language::Telugu, fixtures::stotra("ganesha-ashtakam", "ganesha", ts));

    let check = engine.check_for_updates().await;
    assert!(check.has_updates);
    assert_eq!(check.update_count, 2);
    assert_eq!(prefs.last_sync_timestamp(), first_watermark);

    // Phase 3: incremental sync applies both
    let outcome = engine.sync_new_content().await.unwrap();
    assert_eq!(outcome, SyncOutcome { updated: 2, errors: 0, skipped: 0 });
    assert!(prefs.last_sync_timestamp() > first_watermark);

    let content = &engine.storage().content;
    let raksha = content.find_stotra(Language::Telugu, "rama-raksha").await.unwrap().unwrap();
    assert_eq!(raksha.content, "revised verses");
    assert_eq!(raksha.version_timestamp, ts);
    assert_eq!(content.stotras_for_deity(Language::Telugu, "ganesha").await.unwrap().len(), 2);

    assert!(!engine.check_for_updates().await.has_updates);
}

#[tokio::test]
async fn test_favorites_survive_updates() {
    let (engine, source) = setup(SyncConfig::default()).await;
    engine.initial_setup(Language::Kannada).await;

    assert!(engine.set_favorite(Language::Kannada, "rama-ashtakam", true).await.unwrap());

    let ts = edit_timestamp().await;
    source.add_stotra(Language::Kannada, fixtures::stotra("rama-ashtakam", "rama", ts));
    engine.sync_new_content().await.unwrap();

    let stotra = engine
        .storage()
        .content
        .find_stotra(Language::Kannada, "rama-ashtakam")
        .await
        .unwrap()
        .unwrap();
    assert!(stotra.is_favorite);
    assert_eq!(stotra.version_timestamp, ts);

    let favorites = engine.storage().content.favorites(Language::Kannada).await.unwrap();
    assert_eq!(favorites.len(), 1);
}

#[tokio::test]
async fn test_partial_failure_still_advances_watermark() {
    let (engine, source) = setup(SyncConfig::default()).await;
    engine.initial_setup(Language::Telugu).await;
    let before = engine.storage().preferences.last_sync_timestamp();

    engine
        .storage()
        .content
        .database()
        .execute(
            "CREATE TRIGGER reject_raksha BEFORE UPDATE ON stotras_telugu
             FOR EACH ROW WHEN NEW.stotra_id = 'rama-raksha'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .await
        .unwrap();

    let ts = edit_timestamp().await;
    source.add_stotra(Language::Telugu, fixtures::stotra("rama-raksha", "rama", ts));
    source.add_stotra(Language::Telugu, fixtures::stotra("rama-ashtakam", "rama", ts));
    source.add_stotra(Language::Telugu, fixtures::stotra("hanuman-chalisa", "hanuman", ts));

    let outcome = engine.sync_new_content().await.unwrap();
    assert_eq!(outcome, SyncOutcome { updated: 1, errors: 1, skipped: 1 });
    assert!(engine.storage().preferences.last_sync_timestamp() > before);

    let content = &engine.storage().content;
    let ashtakam = content.find_stotra(Language::Telugu, "rama-ashtakam").await.unwrap().unwrap();
    assert_eq!(ashtakam.version_timestamp, ts);
    let raksha = content.find_stotra(Language::Telugu, "rama-raksha").await.unwrap().unwrap();
    assert_eq!(raksha.version_timestamp, 2_000);
    assert!(content.find_stotra(Language::Telugu, "hanuman-chalisa").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_record_does_not_block_neighbors() {
    let (engine, source) = setup(SyncConfig::default()).await;
    engine.initial_setup(Language::Kannada).await;

    engine
        .storage()
        .content
        .database()
        .execute(
            "CREATE TRIGGER reject_raksha BEFORE UPDATE ON stotras_kannada
             FOR EACH ROW WHEN NEW.stotra_id = 'rama-raksha'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .await
        .unwrap();

    let ts = edit_timestamp().await;
    let updates =
        [("ganesha-pancharatnam", "ganesha"), ("rama-raksha", "rama"), ("rama-ashtakam", "rama")];
    for (id, deity) in updates {
        let mut edited = fixtures::stotra(id, deity, ts);
        edited.content = Some(format!("{} revised", id));
        source.add_stotra(Language::Kannada, edited);
    }

    let outcome = engine.sync_new_content().await.unwrap();
    assert_eq!(outcome, SyncOutcome { updated: 2, errors: 1, skipped: 0 });

    let content = &engine.storage().content;
    for id in ["ganesha-pancharatnam", "rama-ashtakam"] {
        let stotra = content.find_stotra(Language::Kannada, id).await.unwrap().unwrap();
        assert_eq!(stotra.content, format!("{} revised", id));
    }
    let raksha = content.find_stotra(Language::Kannada, "rama-raksha").await.unwrap().unwrap();
    assert_eq!(raksha.version_timestamp, 2_000);
}

#[tokio::test]
async fn test_valid_snapshot_skips_network() {
    let (engine, source) = setup(SyncConfig::default()).await;
    engine.initial_download(Language::Telugu).await.unwrap();
    let calls = source.total_calls();
    let watermark = engine.storage().preferences.last_sync_timestamp();

    source.set_failure(Some(content_sync::RemoteError::network("unreachable")));
    let report = engine.initial_download(Language::Telugu).await.unwrap();

    assert_eq!(report.source, DownloadSource::Snapshot);
    assert_eq!((report.deities, report.stotras), (2, 3));
    assert_eq!(source.total_calls(), calls);
    assert_eq!(engine.storage().preferences.last_sync_timestamp(), watermark);

    let counts = engine.storage().content.counts(Language::Telugu).await.unwrap();
    assert_eq!((counts.deities, counts.stotras), (2, 3));
}

#[tokio::test]
async fn test_offline_reads_still_work() {
    let (engine, source) = setup(SyncConfig::default()).await;
    engine.initial_setup(Language::Telugu).await;
    engine.set_network_state(NetworkState::Offline).await;
    let calls = source.total_calls();

    assert!(matches!(engine.sync_new_content().await, Err(SyncError::Offline)));
    assert!(!engine.check_for_updates().await.has_updates);
    assert_eq!(source.total_calls(), calls);

    let deities = engine.storage().content.deities(Language::Telugu).await.unwrap();
    assert_eq!(deities.len(), 2);
}

#[tokio::test]
async fn test_setup_timeout_continues_in_background() {
    let config = SyncConfig::default().first_run_timeout(Duration::from_millis(50));
    let (engine, source) = setup(config).await;
    source.set_delay(Some(Duration::from_millis(300)));
    let mut events = engine.subscribe();

    let outcome = engine.initial_setup(Language::Kannada).await;
    assert!(matches!(outcome, SetupOutcome::TimedOut));
    assert!(engine.storage().preferences.is_initial_setup_complete());
    assert_eq!(engine.storage().preferences.current_language(), Some(Language::Kannada));
    assert!(engine.is_busy());

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(SyncEvent::Completed { operation }) => break operation,
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(completed, SyncOperation::InitialDownload);

    let counts = engine.storage().content.counts(Language::Kannada).await.unwrap();
    assert_eq!((counts.deities, counts.stotras), (2, 3));
}

#[tokio::test]
async fn test_master_timestamp() {
    let (engine, source) = setup(SyncConfig::default()).await;

    source.set_master_timestamp(Some(1_700_000_000_000));
    assert_eq!(engine.master_timestamp().await, 1_700_000_000_000);

    source.set_master_timestamp(None);
    let before = chrono::Utc::now().timestamp_millis();
    assert!(engine.master_timestamp().await >= before);
}

#[tokio::test]
async fn test_state_persists_across_restart() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = || StorageConfig::new(temp_dir.path()).kv_flush_every_ms(None);

    // Phase 1: download and mark a favorite
    {
        let storage = StorageContext::open(config()).await.unwrap();
        let source = Arc::new(fixtures::sample_source());
        let engine = SyncEngine::new(storage.clone(), source, SyncConfig::default());

        engine.initial_setup(Language::Telugu).await;
        engine.set_favorite(Language::Telugu, "rama-raksha", true).await.unwrap();
        storage.close().await.unwrap();
    }

    // Phase 2: restart against an empty remote
    {
        let storage = StorageContext::open(config()).await.unwrap();
        let source = Arc::new(InMemorySource::new());
        let engine = SyncEngine::new(storage, source.clone(), SyncConfig::default());

        let prefs = &engine.storage().preferences;
        assert!(prefs.is_initial_setup_complete());
        assert_eq!(prefs.current_language(), Some(Language::Telugu));
        assert!(prefs.last_sync_timestamp() > 0);

        let favorites = engine.storage().content.favorites(Language::Telugu).await.unwrap();
        assert_eq!(favorites.len(), 1);

        let report = engine.initial_download(Language::Telugu).await.unwrap();
        assert_eq!(report.source, DownloadSource::Snapshot);
        assert_eq!(source.total_calls(), 0);

        let raksha = engine
            .storage()
            .content
            .find_stotra(Language::Telugu, "rama-raksha")
            .await
            .unwrap()
            .unwrap();
        assert!(raksha.is_favorite);
    }
}
