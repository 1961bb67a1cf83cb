//! Test utilities for content sync
//!
//! [`InMemorySource`] is a scriptable [`RemoteContentSource`] that counts
//! calls and can inject failures or latency. [`fixtures`] builds remote
//! documents.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use storage::Language;

use crate::remote::{RemoteContentSource, RemoteDeity, RemoteError, RemoteStotra, Result};

/// Remote document builders
pub mod fixtures {
    use super::*;

    /// Deity document with a localized name
    pub fn deity(deity_id: &str, name: &str) -> RemoteDeity {
        RemoteDeity {
            deity_id: deity_id.to_string(),
            name: Some(name.to_string()),
            name_english: Some(deity_id.to_string()),
            image: Some(format!("{}.png", deity_id)),
            ..Default::default()
        }
    }

    /// Stotra document at a version timestamp
    pub fn stotra(stotra_id: &str, deity_id: &str, version_timestamp: i64) -> RemoteStotra {
        RemoteStotra {
            stotra_id: stotra_id.to_string(),
            deity_id: deity_id.to_string(),
            title: Some(format!("{} stotram", stotra_id)),
            title_english: Some(stotra_id.to_string()),
            content: Some(format!("{} verses v{}", stotra_id, version_timestamp)),
            version_timestamp: Some(version_timestamp),
            ..Default::default()
        }
    }

    /// Source with two deities and three stotras in each language
    pub fn sample_source() -> InMemorySource {
        let source = InMemorySource::new();
        for language in Language::all() {
            let tag = language.as_str();
            source.add_deity(language, deity("ganesha", &format!("ganesha-{}", tag)));
            source.add_deity(language, deity("rama", &format!("rama-{}", tag)));
            source.add_stotra(language, stotra("ganesha-pancharatnam", "ganesha", 1_000));
            source.add_stotra(language, stotra("rama-raksha", "rama", 2_000));
            source.add_stotra(language, stotra("rama-ashtakam", "rama", 3_000));
        }
        source
    }
}

#[derive(Debug, Default)]
struct Collections {
    deities: HashMap<Language, Vec<RemoteDeity>>,
    stotras: HashMap<Language, Vec<RemoteStotra>>,
    master_timestamp: Option<i64>,
    failure: Option<RemoteError>,
    delay: Option<Duration>,
}

/// Scriptable in-memory remote
#[derive(Debug, Default)]
pub struct InMemorySource {
    state: Mutex<Collections>,
    deity_fetches: AtomicUsize,
    stotra_fetches: AtomicUsize,
    since_fetches: AtomicUsize,
    master_fetches: AtomicUsize,
}

impl InMemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Collections> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a deity document
    pub fn add_deity(&self, language: Language, deity: RemoteDeity) {
        self.state().deities.entry(language).or_default().push(deity);
    }

    /// Add a stotra document, replacing any with the same identifier
    pub fn add_stotra(&self, language: Language, stotra: RemoteStotra) {
        let mut state = self.state();
        let stotras = state.stotras.entry(language).or_default();
        stotras.retain(|s| s.stotra_id != stotra.stotra_id);
        stotras.push(stotra);
    }

    /// Publish a global watermark
    pub fn set_master_timestamp(&self, timestamp: Option<i64>) {
        self.state().master_timestamp = timestamp;
    }

    /// Fail every call with `error` until cleared with `None`
    pub fn set_failure(&self, error: Option<RemoteError>) {
        self.state().failure = error;
    }

    /// Delay every call
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Calls to `fetch_deities`
    pub fn deity_fetches(&self) -> usize {
        self.deity_fetches.load(Ordering::SeqCst)
    }

    /// Calls to `fetch_stotras`
    pub fn stotra_fetches(&self) -> usize {
        self.stotra_fetches.load(Ordering::SeqCst)
    }

    /// Calls to `fetch_stotras_since`
    pub fn since_fetches(&self) -> usize {
        self.since_fetches.load(Ordering::SeqCst)
    }

    /// Calls to any method
    pub fn total_calls(&self) -> usize {
        self.deity_fetches()
            + self.stotra_fetches()
            + self.since_fetches()
            + self.master_fetches.load(Ordering::SeqCst)
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);

        let (delay, failure) = {
            let state = self.state();
            (state.delay, state.failure.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteContentSource for InMemorySource {
    async fn fetch_deities(&self, language: Language) -> Result<Vec<RemoteDeity>> {
        self.enter(&self.deity_fetches).await?;
        Ok(self.state().deities.get(&language).cloned().unwrap_or_default())
    }

    async fn fetch_stotras(&self, language: Language) -> Result<Vec<RemoteStotra>> {
        self.enter(&self.stotra_fetches).await?;
        Ok(self.state().stotras.get(&language).cloned().unwrap_or_default())
    }

    async fn fetch_stotras_since(
        &self,
        language: Language,
        since: i64,
    ) -> Result<Vec<RemoteStotra>> {
        self.enter(&self.since_fetches).await?;
        Ok(self
            .state()
            .stotras
            .get(&language)
            .map(|stotras| {
                stotras
                    .iter()
                    .filter(|s| s.version_timestamp.is_some_and(|ts| ts > since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_master_timestamp(&self) -> Result<Option<i64>> {
        self.enter(&self.master_fetches).await?;
        Ok(self.state().master_timestamp)
    }
}
