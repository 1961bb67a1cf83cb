//! Display language tag
//!
//! Content is stored in language-partitioned tables, so every read and write
//! against the local document store is parameterized by a [`Language`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported display languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Telugu script content
    Telugu,
    /// Kannada script content
    Kannada,
}

impl Language {
    /// All supported languages
    pub fn all() -> [Language; 2] {
        [Language::Telugu, Language::Kannada]
    }

    /// Lowercase tag used in keys, table names and remote collection names
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Telugu => "telugu",
            Language::Kannada => "kannada",
        }
    }

    /// Local table holding deities for this language
    pub fn deities_table(&self) -> &'static str {
        match self {
            Language::Telugu => "deities_telugu",
            Language::Kannada => "deities_kannada",
        }
    }

    /// Local table holding stotras for this language
    pub fn stotras_table(&self) -> &'static str {
        match self {
            Language::Telugu => "stotras_telugu",
            Language::Kannada => "stotras_kannada",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown language tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telugu" | "te" => Ok(Language::Telugu),
            "kannada" | "kn" => Ok(Language::Kannada),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}
