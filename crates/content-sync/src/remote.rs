//! Remote content source contract
//!
//! The remote store owns the authoritative deity and stotra documents and
//! their `version_timestamp` watermarks. This app only reads from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storage::{DeityRecord, Language, StotraRecord};

/// Error from the remote content source
///
/// `status` is the HTTP status, or 0 when the request never completed.
///
/// # Examples
/// ```
/// use content_sync::remote::RemoteError;
///
/// let error = RemoteError::new(503, "Unavailable", "try later");
/// assert!(error.is_network_error());
/// assert!(!RemoteError::new(404, "NotFound", "gone").is_network_error());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Remote error {status}: {code} - {message}")]
pub struct RemoteError {
    status: u16,
    code: String,
    message: String,
}

impl RemoteError {
    /// Create a new remote error
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, code: code.into(), message: message.into() }
    }

    /// Request failed before a response arrived
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, "NetworkError", message)
    }

    /// Response body could not be decoded
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(0, "ParseError", message)
    }

    /// HTTP status code (0 for transport failures)
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether retrying the request may succeed
    pub fn is_network_error(&self) -> bool {
        match self.status {
            0 => self.code != "ParseError",
            408 | 425 | 429 => true,
            status => (500..600).contains(&status),
        }
    }
}

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Deity document as served remotely
///
/// Accepts both the per-language collections (`name`) and the shared
/// collection (`name_telugu` / `name_kannada`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeity {
    /// Stable external identifier
    pub deity_id: String,
    /// Display name (per-language collections)
    #[serde(default)]
    pub name: Option<String>,
    /// Telugu name (shared collection)
    #[serde(default)]
    pub name_telugu: Option<String>,
    /// Kannada name (shared collection)
    #[serde(default)]
    pub name_kannada: Option<String>,
    /// English transliteration
    #[serde(default)]
    pub name_english: Option<String>,
    /// Image reference
    #[serde(default)]
    pub image: Option<String>,
}

impl RemoteDeity {
    /// Display name for a language
    pub fn display_name(&self, language: Language) -> String {
        let localized = match language {
            Language::Telugu => &self.name_telugu,
            Language::Kannada => &self.name_kannada,
        };
        first_present(&[localized, &self.name])
    }

    /// Local row shape for a language
    pub fn to_record(&self, language: Language) -> DeityRecord {
        DeityRecord {
            deity_id: self.deity_id.clone(),
            name: self.display_name(language),
            name_english: self.name_english.clone().unwrap_or_default(),
            image: self.image.clone().unwrap_or_default(),
        }
    }
}

/// Stotra document as served remotely
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStotra {
    /// Stable external identifier
    pub stotra_id: String,
    /// External identifier of the parent deity
    pub deity_id: String,
    /// Display title (per-language collections)
    #[serde(default)]
    pub title: Option<String>,
    /// Telugu title (shared collection)
    #[serde(default)]
    pub title_telugu: Option<String>,
    /// Kannada title (shared collection)
    #[serde(default)]
    pub title_kannada: Option<String>,
    /// English title
    #[serde(default)]
    pub title_english: Option<String>,
    /// Body text (per-language collections)
    #[serde(default)]
    pub content: Option<String>,
    /// Telugu body (shared collection)
    #[serde(default)]
    pub text_telugu: Option<String>,
    /// Kannada body (shared collection)
    #[serde(default)]
    pub text_kannada: Option<String>,
    /// Remote-assigned version, epoch millis
    #[serde(default)]
    pub version_timestamp: Option<i64>,
}

impl RemoteStotra {
    /// Display title for a language
    pub fn display_title(&self, language: Language) -> String {
        let localized = match language {
            Language::Telugu => &self.title_telugu,
            Language::Kannada => &self.title_kannada,
        };
        first_present(&[localized, &self.title])
    }

    /// Body text for a language
    pub fn body(&self, language: Language) -> String {
        let localized = match language {
            Language::Telugu => &self.text_telugu,
            Language::Kannada => &self.text_kannada,
        };
        first_present(&[localized, &self.content])
    }

    /// Local row shape for a language
    ///
    /// A missing `version_timestamp` becomes `now`. New rows start unfavorited.
    pub fn to_record(&self, language: Language, now: i64) -> StotraRecord {
        StotraRecord {
            stotra_id: self.stotra_id.clone(),
            deity_id: self.deity_id.clone(),
            title: self.display_title(language),
            title_english: self.title_english.clone().unwrap_or_default(),
            content: self.body(language),
            is_favorite: false,
            version_timestamp: self.version_timestamp.filter(|ts| *ts > 0).unwrap_or(now),
        }
    }
}

fn first_present(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Read access to the remote deity and stotra collections
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteContentSource: Send + Sync {
    /// Every deity for a language
    async fn fetch_deities(&self, language: Language) -> Result<Vec<RemoteDeity>>;

    /// Every stotra for a language
    async fn fetch_stotras(&self, language: Language) -> Result<Vec<RemoteStotra>>;

    /// Stotras whose `version_timestamp` is strictly greater than `since`
    async fn fetch_stotras_since(
        &self,
        language: Language,
        since: i64,
    ) -> Result<Vec<RemoteStotra>>;

    /// Global content watermark, if the remote publishes one
    async fn fetch_master_timestamp(&self) -> Result<Option<i64>>;
}
