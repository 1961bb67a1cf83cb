//! Integration tests for the HTTP content source
//!
//! These tests use wiremock to serve the document collections and check
//! request shapes, error mapping, and retry behavior.

use content_sync::{
    CollectionLayout, HttpContentSource, RemoteConfig, RemoteContentSource, RetryConfig,
};
use serde_json::json;
use std::time::Duration;
use storage::Language;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> HttpContentSource {
    let config = RemoteConfig::new(server.uri())
        .with_retry(RetryConfig::new(2).with_initial_delay(Duration::from_millis(10)));
    HttpContentSource::new(config).unwrap()
}

// =============================================================================
// Collections
// =============================================================================

#[tokio::test]
async fn test_fetch_deities_per_language_collection() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/deities_telugu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                {"deity_id": "ganesha", "name": "గణేశుడు", "name_english": "Ganesha", "image": "ganesha.png"},
                {"deity_id": "rama", "name": "రాముడు"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let deities = source(&server).fetch_deities(Language::Telugu).await.unwrap();

    assert_eq!(deities.len(), 2);
    assert_eq!(deities[0].to_record(Language::Telugu).name, "గణేశుడు");
    assert_eq!(deities[1].image, None);
}

#[tokio::test]
async fn test_fetch_stotras_since_sends_watermark() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/stotras_kannada"))
        .and(query_param("version_timestamp_gt", "1700000000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                {"stotra_id": "s9", "deity_id": "rama", "title": "ರಾಮ", "content": "...", "version_timestamp": 1700000000500i64}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stotras = source(&server)
        .fetch_stotras_since(Language::Kannada, 1_700_000_000_000)
        .await
        .unwrap();

    assert_eq!(stotras.len(), 1);
    assert_eq!(stotras[0].version_timestamp, Some(1_700_000_000_500));
}

#[tokio::test]
async fn test_shared_layout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/stotras"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{
                "stotra_id": "s1",
                "deity_id": "shiva",
                "title_telugu": "శివ",
                "title_kannada": "ಶಿವ",
                "text_telugu": "te",
                "text_kannada": "kn"
            }]
        })))
        .mount(&server)
        .await;

    let config = RemoteConfig::new(server.uri()).with_layout(CollectionLayout::Shared);
    let source = HttpContentSource::new(config).unwrap();
    let stotras = source.fetch_stotras(Language::Kannada).await.unwrap();

    let record = stotras[0].to_record(Language::Kannada, 42);
    assert_eq!(record.title, "ಶಿವ");
    assert_eq!(record.content, "kn");
    assert_eq!(record.version_timestamp, 42);
}

// =============================================================================
// Master timestamp
// =============================================================================

#[tokio::test]
async fn test_master_timestamp() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/config/global"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"master_timestamp": 1234})))
        .mount(&server)
        .await;

    assert_eq!(source(&server).fetch_master_timestamp().await.unwrap(), Some(1234));
}

#[tokio::test]
async fn test_master_timestamp_missing_document() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/config/global"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "NotFound",
            "message": "no such document"
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(source(&server).fetch_master_timestamp().await.unwrap(), None);
}

// =============================================================================
// Errors and retries
// =============================================================================

#[tokio::test]
async fn test_error_body_is_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/deities_kannada"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "PermissionDenied",
            "message": "rules rejected read"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let error = source(&server).fetch_deities(Language::Kannada).await.unwrap_err();

    assert_eq!(error.status(), 403);
    assert_eq!(error.code(), "PermissionDenied");
    assert_eq!(error.message(), "rules rejected read");
    assert!(!error.is_network_error());
}

#[tokio::test]
async fn test_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/deities_telugu"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/deities_telugu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": []})))
        .mount(&server)
        .await;

    let deities = source(&server).fetch_deities(Language::Telugu).await.unwrap();
    assert!(deities.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections/stotras_telugu"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let error = source(&server).fetch_stotras(Language::Telugu).await.unwrap_err();
    assert_eq!(error.code(), "ParseError");
}
