use std::sync::{Arc, Mutex};

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sycamore_http::{RequestError, ReqwestExecutor};
use sycamore_requester::{CacheSpec, Descriptor, Host, HostMember, RequestMap, Requester};

struct Client {
    base: String,
    failures: Mutex<Vec<u16>>,
}

impl Client {
    fn new(base: String) -> Self {
        Self {
            base,
            failures: Mutex::new(Vec::new()),
        }
    }
}

impl Host for Client {
    fn requests(&self) -> RequestMap<Self> {
        RequestMap::from([
            (
                "league".to_string(),
                Descriptor::get(format!("{}/leagues/{{id}}", self.base))
                    .with_cache(CacheSpec::memory("league", 1.0)),
            ),
            (
                "createOwner".to_string(),
                Descriptor::post(format!("{}/owners", self.base))
                    .with_data(json!({ "ownerId": 45678, "name": "X" })),
            ),
            (
                "deleteTeam".to_string(),
                Descriptor::delete(format!("{}/teams/{{id}}", self.base)).with_fail("onFail"),
            ),
        ])
    }

    fn member(&self, name: &str) -> Option<HostMember<Self>> {
        match name {
            "onFail" => Some(HostMember::callback(|client: &Client, outcome| {
                if let Err(RequestError::Status { status, .. }) = outcome {
                    client.failures.lock().unwrap().push(*status);
                }
            })),
            _ => None,
        }
    }
}

fn requester(base: String) -> Requester<Client> {
    let executor = ReqwestExecutor::with_default_timeout().unwrap();
    Requester::new(Client::new(base), Arc::new(executor)).unwrap()
}

#[tokio::test]
async fn test_cached_get_hits_server_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/leagues/98765"))
        .and(query_param("sort", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Sunday" })))
        .expect(1)
        .mount(&server)
        .await;

    let base = server.uri();
    let (first, second) = tokio::task::spawn_blocking(move || {
        let requester = requester(base);
        let data = json!({ "id": 98765, "sort": "desc" });
        let first = requester
            .execute("league", Some(data.clone()))
            .unwrap()
            .wait()
            .unwrap();
        let second = requester
            .execute("league", Some(data))
            .unwrap()
            .wait()
            .unwrap();
        (first, second)
    })
    .await
    .unwrap();

    assert_eq!(first.body["name"], "Sunday");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/owners"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(body_json(json!({ "ownerId": 45678, "name": "X" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "created": true })))
        .mount(&server)
        .await;

    let base = server.uri();
    let response = tokio::task::spawn_blocking(move || {
        requester(base).fetch("createOwner").unwrap().wait().unwrap()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.body["created"], true);
}

#[tokio::test]
async fn test_error_status_reaches_fail_callback() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/teams/3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let base = server.uri();
    let (outcome, failures) = tokio::task::spawn_blocking(move || {
        let requester = requester(base);
        let outcome = requester
            .execute("deleteTeam", Some(json!({ "id": 3 })))
            .unwrap()
            .wait();
        let failures = requester.host().failures.lock().unwrap().clone();
        (outcome, failures)
    })
    .await
    .unwrap();

    assert!(matches!(
        outcome,
        Err(RequestError::Status { status: 404, .. })
    ));
    assert_eq!(failures, vec![404]);
}

#[tokio::test]
async fn test_nocache_appends_cache_buster() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let url = format!("{}/live", server.uri());
    let base = server.uri();
    tokio::task::spawn_blocking(move || {
        requester(base)
            .fetch(Descriptor::get(url).with_nocache(true))
            .unwrap()
            .wait()
            .unwrap()
    })
    .await
    .unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0]
        .url
        .query_pairs()
        .any(|(key, value)| key == "_" && value.parse::<i64>().is_ok()));
}
