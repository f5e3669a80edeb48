//! Exercises `Session::get`'s response classification and retry/backoff
//! loop against a mock server, bypassing the real login handshake.

use std::time::Duration;

use fstree_error::Error;
use fstree_http::{Session, SessionConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(base_url: &str) -> SessionConfig {
    SessionConfig {
        username: "user".into(),
        password: "pass".into(),
        timeout: Duration::from_secs(5),
        requests_per_second: 1000.0,
        max_retries: 2,
        backoff_base_seconds: 0.0,
        backoff_multiplier: 1.0,
        backoff_max_seconds: 0.0,
        base_url: base_url.to_string(),
    }
}

#[tokio::test]
async fn successful_json_response_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/platform/tree/persons"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"persons": []})))
        .mount(&server)
        .await;

    let session = Session::connect_without_login(config_for(&server.uri())).unwrap();
    let body = session.get("/platform/tree/persons").await.unwrap();
    assert_eq!(body, Some(serde_json::json!({"persons": []})));
    assert_eq!(session.counter(), 1);
}

#[tokio::test]
async fn not_found_is_treated_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/missing")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

    let session = Session::connect_without_login(config_for(&server.uri())).unwrap();
    let body = session.get("/missing").await.unwrap();
    assert_eq!(body, None);
}

#[tokio::test]
async fn server_error_retries_then_exhausts_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/flaky")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

    let session = Session::connect_without_login(config_for(&server.uri())).unwrap();
    let err = session.get("/flaky").await.unwrap_err();
    assert!(matches!(err, Error::TransportTransient(_)));
    // One initial attempt plus `max_retries` retries.
    assert_eq!(session.counter(), 3);
}

#[tokio::test]
async fn server_error_succeeds_after_a_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recovers"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let session = Session::connect_without_login(config_for(&server.uri())).unwrap();
    let body = session.get("/recovers").await.unwrap();
    assert_eq!(body, Some(serde_json::json!({"ok": true})));
    assert_eq!(session.counter(), 2);
}
