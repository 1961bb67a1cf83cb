//! First-run setup and language switching

use std::time::Duration;
use storage::Language;

use crate::engine::{
    DownloadReport, Result, SnapshotInvalidation, SyncEngine, SyncError, SyncOperation,
};

/// Result of first-run setup
#[derive(Debug)]
pub enum SetupOutcome {
    /// Content was downloaded before the timeout
    Downloaded(DownloadReport),
    /// The timeout elapsed; the download keeps running in the background
    TimedOut,
    /// The download failed
    Failed(SyncError),
}

impl SetupOutcome {
    /// Whether content was available when setup returned
    pub fn is_downloaded(&self) -> bool {
        matches!(self, SetupOutcome::Downloaded(_))
    }
}

impl SyncEngine {
    /// Make `language` the current language and load its content
    ///
    /// Applies the configured [`SnapshotInvalidation`] policy, persists the
    /// choice, then downloads the language: from its snapshot when one is
    /// valid, from the remote otherwise.
    pub async fn switch_language(&self, language: Language) -> Result<DownloadReport> {
        let _guard = self.try_guard()?;
        let result = self.switch_locked(language).await;
        self.finish(SyncOperation::LanguageSwitch, &result);
        result
    }

    async fn switch_locked(&self, language: Language) -> Result<DownloadReport> {
        if self.config().snapshot_invalidation == SnapshotInvalidation::AllLanguages {
            let cleared = self.storage().snapshots.clear()?;
            tracing::info!("Cleared {} cache snapshots", cleared);
        }

        self.storage().preferences.set_current_language(language);
        tracing::info!("Switched language to {}", language);
        self.download_locked(language, SyncOperation::LanguageSwitch).await
    }

    /// Run an initial download on a background task, waiting at most `timeout`
    ///
    /// When the wait times out the task is not cancelled; it finishes in the
    /// background and its result is reported through events.
    pub async fn download_with_timeout(
        &self,
        language: Language,
        timeout: Duration,
    ) -> Result<DownloadReport> {
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.initial_download(language).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(SyncError::Interrupted(join_error.to_string())),
            Err(_) => {
                tracing::warn!("Download for {} still running after {:?}", language, timeout);
                Err(SyncError::Timeout(timeout))
            }
        }
    }

    /// First-run setup for a chosen language
    ///
    /// The language is persisted and setup marked complete whatever happens
    /// to the download, so the app never blocks on a second first run.
    pub async fn initial_setup(&self, language: Language) -> SetupOutcome {
        let prefs = &self.storage().preferences;
        prefs.set_current_language(language);

        let timeout = self.config().first_run_timeout;
        let outcome = match self.download_with_timeout(language, timeout).await {
            Ok(report) => SetupOutcome::Downloaded(report),
            Err(SyncError::Timeout(_)) => SetupOutcome::TimedOut,
            Err(e) => {
                tracing::error!("Initial setup download failed: {}", e);
                SetupOutcome::Failed(e)
            }
        };

        prefs.mark_initial_setup_complete();
        outcome
    }
}
