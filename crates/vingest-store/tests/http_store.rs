//! HTTP catalog client tests.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vingest_models::VideoRecord;
use vingest_store::{HttpVideoStore, StoreConfig, StoreError, VideoStore};

fn record() -> VideoRecord {
    VideoRecord {
        id: "v1".to_string(),
        channel_id: "c1".to_string(),
        snippet: json!({"title": "hello"}),
        status: json!({"privacyStatus": "public"}),
    }
}

fn client(server: &MockServer) -> HttpVideoStore {
    HttpVideoStore::new(StoreConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .expect("Failed to create store client")
}

#[tokio::test]
async fn upsert_puts_record_body_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/videos/v1"))
        .and(body_json(json!({
            "channelId": "c1",
            "snippet": {"title": "hello"},
            "status": {"privacyStatus": "public"},
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .upsert(&record())
        .await
        .expect("upsert should succeed");
}

#[tokio::test]
async fn upsert_is_repeatable() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/videos/v1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let store = client(&server);
    store.upsert(&record()).await.expect("first upsert");
    store.upsert(&record()).await.expect("second upsert");
}

#[tokio::test]
async fn upsert_maps_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server)
        .upsert(&record())
        .await
        .expect_err("upsert should fail");

    assert!(matches!(err, StoreError::RequestFailed(_)));
}
