//! Periodic background sync
//!
//! The host platform decides when background work may run; [`AutoSync`]
//! decides whether it should, and runs an incremental sync when due.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::engine::{NetworkState, SyncEngine};

/// Result of a background sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSyncResult {
    /// Auto-sync is turned off
    Disabled,
    /// The last run is more recent than the interval
    NotDue,
    /// Network is known to be unavailable
    Offline,
    /// Sync ran and nothing changed
    NoData,
    /// Sync ran and updated this many stotras
    NewData(usize),
    /// Sync failed
    Failed(String),
}

/// Interval-gated background sync
#[derive(Debug, Clone)]
pub struct AutoSync {
    engine: SyncEngine,
    interval: Duration,
}

impl AutoSync {
    /// Create a scheduler using the engine's configured interval
    pub fn new(engine: SyncEngine) -> Self {
        let interval = engine.config().auto_sync_interval;
        Self { engine, interval }
    }

    /// Override the interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Minimum spacing between runs
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the user has auto-sync enabled
    pub fn is_enabled(&self) -> bool {
        self.engine.storage().preferences.auto_sync_enabled()
    }

    /// Turn auto-sync on
    pub fn enable(&self) {
        self.engine.storage().preferences.set_auto_sync_enabled(true);
        tracing::info!("Auto-sync enabled");
    }

    /// Turn auto-sync off
    pub fn disable(&self) {
        self.engine.storage().preferences.set_auto_sync_enabled(false);
        tracing::info!("Auto-sync disabled");
    }

    /// When the last successful background sync ran
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.engine
            .storage()
            .preferences
            .last_auto_sync()
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Earliest time of the next run; `None` when disabled or never run
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }
        let interval = chrono::Duration::from_std(self.interval).ok()?;
        self.last_run().map(|last| last + interval)
    }

    /// Whether a run at `now` is allowed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.next_run() {
            Some(next) => now >= next,
            None => true,
        }
    }

    /// Run an incremental sync if enabled, due and online
    pub async fn run_if_due(&self, now: DateTime<Utc>) -> AutoSyncResult {
        if !self.is_enabled() {
            return AutoSyncResult::Disabled;
        }
        if !self.is_due(now) {
            tracing::debug!("Auto-sync not due until {:?}", self.next_run());
            return AutoSyncResult::NotDue;
        }
        if self.engine.network_state().await == NetworkState::Offline {
            tracing::info!("Skipping auto-sync while offline");
            return AutoSyncResult::Offline;
        }

        match self.engine.sync_new_content().await {
            Ok(outcome) => {
                self.engine.storage().preferences.set_last_auto_sync(now.timestamp_millis());
                tracing::info!("Auto-sync updated {} stotras", outcome.updated);
                if outcome.updated > 0 {
                    AutoSyncResult::NewData(outcome.updated)
                } else {
                    AutoSyncResult::NoData
                }
            }
            Err(e) => {
                tracing::error!("Auto-sync failed: {}", e);
                AutoSyncResult::Failed(e.to_string())
            }
        }
    }
}
