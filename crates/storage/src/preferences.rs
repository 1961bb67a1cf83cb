//! User preferences and sync bookkeeping
//!
//! Scalar settings persisted in the key-value store under the `bhaktivani`
//! scope. Reads fall back to a default and writes log failures instead of
//! returning them, so a broken preference never blocks the reader.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::kv::KvStore;
use crate::language::Language;

const SCOPE: &str = "bhaktivani";

/// Preference key names within the `bhaktivani` scope
pub mod keys {
    /// Selected display language
    pub const CURRENT_LANGUAGE: &str = "currentLanguage";
    /// Watermark for incremental sync, epoch millis
    pub const LAST_SYNC_TIMESTAMP: &str = "lastSyncTimestamp";
    /// First-run flow finished
    pub const INITIAL_SETUP_COMPLETE: &str = "initialSetupComplete";
    /// Prefix for per-language content version stamps
    pub const CONTENT_VERSION: &str = "contentVersion";
    /// Counts recorded by the last full download
    pub const SYNC_STATS: &str = "syncStats";
    /// Reader font size
    pub const FONT_SIZE: &str = "fontSize";
    /// Reader color theme
    pub const THEME: &str = "theme";
    /// Weekly background sync toggle
    pub const AUTO_SYNC_ENABLED: &str = "autoSyncEnabled";
    /// Last background sync run, epoch millis
    pub const LAST_AUTO_SYNC: &str = "lastAutoSync";
    /// Highest applied local schema version
    pub const MIGRATION_VERSION: &str = "migrationVersion";
}

/// Reader font size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    /// 14pt
    Small,
    /// 18pt
    #[default]
    Medium,
    /// 22pt
    Large,
}

impl FontSize {
    /// Point size used by the reader
    pub fn points(&self) -> u16 {
        match self {
            FontSize::Small => 14,
            FontSize::Medium => 18,
            FontSize::Large => 22,
        }
    }
}

/// Reader color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// White background
    #[default]
    Light,
    /// Warm paper background
    Sepia,
    /// Dark background
    Dark,
}

/// Colors for a theme, as hex strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemePalette {
    /// Page background
    pub background: &'static str,
    /// Body text
    pub text: &'static str,
    /// Cards and panels
    pub surface: &'static str,
}

impl Theme {
    /// Colors used to render this theme
    pub fn palette(&self) -> ThemePalette {
        match self {
            Theme::Light => {
                ThemePalette { background: "#FFFFFF", text: "#1F2937", surface: "#F9FAFB" }
            }
            Theme::Sepia => {
                ThemePalette { background: "#F5F0E6", text: "#1F2937", surface: "#F9F7F3" }
            }
            Theme::Dark => {
                ThemePalette { background: "#111827", text: "#F9FAFB", surface: "#1F2937" }
            }
        }
    }
}

/// Counts recorded after a full download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Deities downloaded
    pub deity_count: usize,
    /// Stotras downloaded
    pub stotra_count: usize,
    /// When the stats were recorded, epoch millis
    pub last_sync: i64,
}

/// Typed accessors over the preference keys
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    kv: KvStore,
}

impl PreferenceStore {
    /// Create a preference store over a key-value store
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.kv.get_scoped(&[SCOPE, key]) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read preference {}: {}", key, e);
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.kv.set_scoped(&[SCOPE, key], value) {
            tracing::warn!("Failed to write preference {}: {}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.kv.remove_scoped(&[SCOPE, key]) {
            tracing::warn!("Failed to remove preference {}: {}", key, e);
        }
    }

    /// Currently selected language, if any
    pub fn current_language(&self) -> Option<Language> {
        self.read(keys::CURRENT_LANGUAGE)
    }

    /// Persist the selected language
    pub fn set_current_language(&self, language: Language) {
        self.write(keys::CURRENT_LANGUAGE, &language);
    }

    /// Incremental sync watermark, 0 when never synced
    pub fn last_sync_timestamp(&self) -> i64 {
        self.read(keys::LAST_SYNC_TIMESTAMP).unwrap_or(0)
    }

    /// Update the incremental sync watermark
    pub fn set_last_sync_timestamp(&self, timestamp: i64) {
        self.write(keys::LAST_SYNC_TIMESTAMP, &timestamp);
    }

    /// Whether the first-run flow has finished
    pub fn is_initial_setup_complete(&self) -> bool {
        self.read(keys::INITIAL_SETUP_COMPLETE).unwrap_or(false)
    }

    /// Record that the first-run flow has finished
    pub fn mark_initial_setup_complete(&self) {
        self.write(keys::INITIAL_SETUP_COMPLETE, &true);
    }

    /// Sync watermark of a language's local rows, 0 when never downloaded
    ///
    /// Incremental sync asks the remote for stotras newer than this value, so
    /// each language catches up on its own edits.
    pub fn content_version(&self, language: Language) -> i64 {
        self.read(&content_version_key(language)).unwrap_or(0)
    }

    /// Record how far a language's local rows are synced
    pub fn set_content_version(&self, language: Language, version: i64) {
        self.write(&content_version_key(language), &version);
    }

    /// Counts from the last full download
    pub fn sync_stats(&self) -> SyncStats {
        self.read(keys::SYNC_STATS).unwrap_or_default()
    }

    /// Record download counts, stamped with the current time
    pub fn set_sync_stats(&self, deity_count: usize, stotra_count: usize) {
        let stats = SyncStats {
            deity_count,
            stotra_count,
            last_sync: chrono::Utc::now().timestamp_millis(),
        };
        self.write(keys::SYNC_STATS, &stats);
    }

    /// Reader font size
    pub fn font_size(&self) -> FontSize {
        self.read(keys::FONT_SIZE).unwrap_or_default()
    }

    /// Set reader font size
    pub fn set_font_size(&self, size: FontSize) {
        self.write(keys::FONT_SIZE, &size);
    }

    /// Reader theme
    pub fn theme(&self) -> Theme {
        self.read(keys::THEME).unwrap_or_default()
    }

    /// Set reader theme
    pub fn set_theme(&self, theme: Theme) {
        self.write(keys::THEME, &theme);
    }

    /// Whether weekly background sync is on (default true)
    pub fn auto_sync_enabled(&self) -> bool {
        self.read(keys::AUTO_SYNC_ENABLED).unwrap_or(true)
    }

    /// Toggle weekly background sync
    pub fn set_auto_sync_enabled(&self, enabled: bool) {
        self.write(keys::AUTO_SYNC_ENABLED, &enabled);
    }

    /// Last background sync run
    pub fn last_auto_sync(&self) -> Option<i64> {
        self.read(keys::LAST_AUTO_SYNC)
    }

    /// Record a background sync run
    pub fn set_last_auto_sync(&self, timestamp: i64) {
        self.write(keys::LAST_AUTO_SYNC, &timestamp);
    }

    /// Highest applied schema version, 0 when unknown
    pub fn migration_version(&self) -> i64 {
        self.read(keys::MIGRATION_VERSION).unwrap_or(0)
    }

    /// Record the applied schema version
    pub fn set_migration_version(&self, version: i64) {
        self.write(keys::MIGRATION_VERSION, &version);
    }

    /// Forget the language choice, watermark and setup flag
    pub fn reset_language_settings(&self) {
        self.remove(keys::CURRENT_LANGUAGE);
        self.remove(keys::LAST_SYNC_TIMESTAMP);
        self.remove(keys::INITIAL_SETUP_COMPLETE);
        tracing::info!("Language settings reset");
    }
}

fn content_version_key(language: Language) -> String {
    KvStore::scoped_key(&[keys::CONTENT_VERSION, language.as_str()])
}
