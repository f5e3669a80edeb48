//! Runs one BFS hop against a `wiremock` stand-in for the FamilySearch
//! Tree API, checking that a fetched person and the parent-child link it
//! carries land in the store.

use fstree_control::ControlPlane;
use fstree_http::{Session, SessionConfig};
use fstree_store::Store;
use fstree_types::{FsId, ThrottleConfig};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_for(base_url: &str) -> Session {
    Session::connect_without_login(SessionConfig {
        username: "user".into(),
        password: "pass".into(),
        timeout: Duration::from_secs(5),
        requests_per_second: 1000.0,
        max_retries: 1,
        backoff_base_seconds: 0.0,
        backoff_multiplier: 1.0,
        backoff_max_seconds: 0.0,
        base_url: base_url.to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn one_hop_fetches_persons_and_records_a_parent_child_edge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/platform/tree/persons/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "persons": [{
                "id": "ABCD-123",
                "gender": {"type": "http://gedcomx.org/Female"},
                "names": [{"preferred": true, "nameForms": [{"parts": [
                    {"type": "http://gedcomx.org/Given", "value": "Jane"},
                    {"type": "http://gedcomx.org/Surname", "value": "Doe"}
                ]}]}]
            }],
            "childAndParentsRelationships": [{
                "id": "REL0-001",
                "child": {"resourceId": "ABCD-123"},
                "parent1": {"resourceId": "PARE-001"}
            }]
        })))
        .mount(&server)
        .await;

    let session = session_for(&server.uri());
    let store = Store::open_in_memory().unwrap();
    store.seed_frontier_if_empty(&[FsId::new("ABCD-123").unwrap()]).unwrap();
    let control = ControlPlane::new();
    let throttle = ThrottleConfig { delay_between_person_batches: 0.0, ..ThrottleConfig::default() };

    fstree_engine::iterate(&session, &store, &throttle, &control, None, 0).await.unwrap();

    assert_eq!(store.processing_count().unwrap(), 0);
    let counts = store.get_relationship_count().unwrap();
    assert_eq!(counts.within + counts.spanning, 1);
}
