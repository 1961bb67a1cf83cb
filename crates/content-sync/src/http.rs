//! HTTP implementation of the remote content source
//!
//! Collections are served as JSON document lists:
//!
//! - `GET {base}/collections/{collection}` returns `{"documents": [...]}`
//! - `?version_timestamp_gt={since}` restricts stotras to newer versions
//! - `GET {base}/collections/config/global` returns `{"master_timestamp": ...}`

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response as ReqwestResponse, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use storage::Language;

use crate::remote::{RemoteContentSource, RemoteDeity, RemoteError, RemoteStotra, Result};
use crate::retry::{network_retry, RetryConfig};

/// How collections are named on the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionLayout {
    /// `deities_<lang>` / `stotras_<lang>`
    #[default]
    PerLanguage,
    /// `deities` / `stotras` with per-language fields in each document
    Shared,
}

impl CollectionLayout {
    /// Deity collection name for a language
    pub fn deities(&self, language: Language) -> String {
        match self {
            CollectionLayout::PerLanguage => format!("deities_{}", language),
            CollectionLayout::Shared => "deities".to_string(),
        }
    }

    /// Stotra collection name for a language
    pub fn stotras(&self, language: Language) -> String {
        match self {
            CollectionLayout::PerLanguage => format!("stotras_{}", language),
            CollectionLayout::Shared => "stotras".to_string(),
        }
    }
}

/// Configuration for the HTTP content source
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Collection naming scheme
    pub layout: CollectionLayout,
    /// Retry policy for network-class failures
    pub retry: RetryConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("BhaktiVani/{}", env!("CARGO_PKG_VERSION")),
            layout: CollectionLayout::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RemoteConfig {
    /// Create a config for a base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Default::default() }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the collection layout
    pub fn with_layout(mut self, layout: CollectionLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Deserialize)]
struct DocumentList<T> {
    documents: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GlobalConfig {
    #[serde(default)]
    master_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

/// Remote content source over HTTP
#[derive(Debug, Clone)]
pub struct HttpContentSource {
    client: ReqwestClient,
    config: RemoteConfig,
}

impl HttpContentSource {
    /// Create a source, building the HTTP client
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                RemoteError::new(0, "ClientError", format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Source configuration
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get<T>(&self, path: &str, params: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let url = url.as_str();
        let client = &self.client;

        network_retry(&self.config.retry, || async move {
            let response = client
                .get(url)
                .query(params)
                .send()
                .await
                .map_err(|e| RemoteError::network(format!("Request failed: {}", e)))?;

            parse_response(response).await
        })
        .await
    }

    async fn documents<T>(&self, collection: &str, params: &[(&str, String)]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let list: DocumentList<T> = self.get(&format!("collections/{}", collection), params).await?;
        tracing::debug!("Fetched {} documents from {}", list.documents.len(), collection);
        Ok(list.documents)
    }
}

async fn parse_response<T>(response: ReqwestResponse) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => RemoteError::new(status.as_u16(), err.error, err.message),
            Err(_) => {
                RemoteError::new(status.as_u16(), "Unknown", format!("HTTP {}: {}", status, body))
            }
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::network(format!("Failed to read response: {}", e)))?;

    serde_json::from_str(&body)
        .map_err(|e| RemoteError::parse(format!("Failed to parse JSON: {}", e)))
}

#[async_trait]
impl RemoteContentSource for HttpContentSource {
    async fn fetch_deities(&self, language: Language) -> Result<Vec<RemoteDeity>> {
        self.documents(&self.config.layout.deities(language), &[]).await
    }

    async fn fetch_stotras(&self, language: Language) -> Result<Vec<RemoteStotra>> {
        self.documents(&self.config.layout.stotras(language), &[]).await
    }

    async fn fetch_stotras_since(
        &self,
        language: Language,
        since: i64,
    ) -> Result<Vec<RemoteStotra>> {
        self.documents(
            &self.config.layout.stotras(language),
            &[("version_timestamp_gt", since.to_string())],
        )
        .await
    }

    async fn fetch_master_timestamp(&self) -> Result<Option<i64>> {
        match self.get::<GlobalConfig>("collections/config/global", &[]).await {
            Ok(config) => Ok(config.master_timestamp),
            Err(e) if e.status() == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert_eq!(CollectionLayout::PerLanguage.deities(Language::Telugu), "deities_telugu");
        assert_eq!(CollectionLayout::PerLanguage.stotras(Language::Kannada), "stotras_kannada");
        assert_eq!(CollectionLayout::Shared.stotras(Language::Kannada), "stotras");
    }

    #[test]
    fn test_config_builder() {
        let config = RemoteConfig::new("https://content.example.com/")
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("Test/1.0")
            .with_layout(CollectionLayout::Shared)
            .with_retry(RetryConfig::none());

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.layout, CollectionLayout::Shared);
        assert_eq!(config.retry.max_retries, 0);

        let source = HttpContentSource::new(config).unwrap();
        assert_eq!(
            source.url("collections/deities"),
            "https://content.example.com/collections/deities"
        );
    }

    #[test]
    fn test_default_user_agent() {
        assert!(RemoteConfig::default().user_agent.starts_with("BhaktiVani/"));
    }
}
