//! Integration tests for the HTTP transport against mock servers

use bytes::Bytes;
use c8db_http::HttpCommunication;
use c8db_net::{ClientConfig, Error, HostDescription, Method, Request, Service};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn host_of(server: &MockServer) -> HostDescription {
    HostDescription::parse(&server.uri()).unwrap()
}

async fn client_for(servers: &[&MockServer]) -> HttpCommunication {
    let mut config = ClientConfig::new();
    for server in servers {
        let host = host_of(server);
        config = config.with_host(host.host(), host.port());
    }
    HttpCommunication::new(config).await.unwrap()
}

#[tokio::test]
async fn test_roundtrip_carries_params_body_and_basic_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_api/collection"))
        .and(query_param("waitForSync", "true"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Basic cm9vdDpzZWNyZXQ="))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(br#"{"name":"users","status":3}"#.to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let host = host_of(&server);
    let config = ClientConfig::new()
        .with_host(host.host(), host.port())
        .with_basic_auth("root", "secret");
    let client = HttpCommunication::new(config).await.unwrap();

    let request = Request::new("_system", Method::Post, "/_api/collection")
        .with_query_param("waitForSync", Some(true))
        .with_body(Bytes::from_static(br#"{"name":"users"}"#));
    let response = client
        .execute(&request, None, Service::Database)
        .await
        .unwrap();

    assert_eq!(response.code(), 200);
    assert_eq!(
        response.body().map(|body| body.as_ref()),
        Some(br#"{"name":"users","status":3}"#.as_ref())
    );
}

#[tokio::test]
async fn test_jwt_credentials_use_bearer_scheme() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_api/version"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let host = host_of(&server);
    let config = ClientConfig::new()
        .with_host(host.host(), host.port())
        .with_jwt("token-123");
    let client = HttpCommunication::new(config).await.unwrap();

    let request = Request::new("_system", Method::Get, "/_api/version");
    let response = client
        .execute(&request, None, Service::Database)
        .await
        .unwrap();
    assert_eq!(response.code(), 200);
}

#[tokio::test]
async fn test_dirty_read_marker_travels_as_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_api/document/users/1"))
        .and(header("X-C8-Allow-Dirty-Read", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&[&server]).await;
    let request =
        Request::new("_system", Method::Get, "/_api/document/users/1").with_allow_dirty_read(true);
    let response = client
        .execute(&request, None, Service::Database)
        .await
        .unwrap();
    assert_eq!(response.code(), 200);
}

#[tokio::test]
async fn test_endpoint_hint_retries_against_hinted_host() {
    let redirecting = MockServer::start().await;
    let target = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_api/version"))
        .respond_with(ResponseTemplate::new(503).insert_header("X-C8-Endpoint", target.uri()))
        .expect(1)
        .mount(&redirecting)
        .await;

    Mock::given(method("GET"))
        .and(path("/_api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(br#"{"leader":true}"#.to_vec()))
        .expect(1)
        .mount(&target)
        .await;

    // Listing order makes the redirecting node the round-robin's first pick
    let client = client_for(&[&redirecting, &target]).await;
    let request = Request::new("_system", Method::Get, "/_api/version");
    let response = client
        .execute(&request, None, Service::Database)
        .await
        .unwrap();

    // The 503 never surfaces; the caller sees the target's answer
    assert_eq!(response.code(), 200);
    assert_eq!(
        response.body().map(|body| body.as_ref()),
        Some(br#"{"leader":true}"#.as_ref())
    );
}

#[tokio::test]
async fn test_structured_error_surfaces_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_api/document/users/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_bytes(
            br#"{"code":404,"errorNum":1202,"errorMessage":"document not found"}"#.to_vec(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&[&server]).await;
    let request = Request::new("_system", Method::Get, "/_api/document/users/missing");
    let err = client
        .execute(&request, None, Service::Database)
        .await
        .unwrap_err();

    match err {
        Error::Api(payload) => {
            assert_eq!(payload.code, 404);
            assert_eq!(payload.error_num, 1202);
            assert_eq!(payload.error_message.as_deref(), Some("document not found"));
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_overload_without_hint_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_api/version"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&[&server]).await;
    let request = Request::new("_system", Method::Get, "/_api/version");
    let err = client
        .execute(&request, None, Service::Database)
        .await
        .unwrap_err();

    match err {
        Error::Internal { code, .. } => assert_eq!(code, 503),
        other => panic!("expected internal error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_host_fails_over_to_live_one() {
    let live = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_api/version"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&live)
        .await;

    let live_host = host_of(&live);
    let config = ClientConfig::new()
        .with_host("127.0.0.1", 1)
        .with_host(live_host.host(), live_host.port());
    let client = HttpCommunication::new(config).await.unwrap();

    let request = Request::new("_system", Method::Get, "/_api/version");
    let response = client
        .execute(&request, None, Service::Database)
        .await
        .unwrap();
    assert_eq!(response.code(), 200);
}
