use std::time::{Duration, SystemTime};

use pmilib::{features::HealthCheck, fetch::ChainClient};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header_exists, method, path, query_param},
};

fn client(server: &MockServer) -> ChainClient {
    ChainClient::with_endpoints(&server.uri(), &server.uri(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn producer_rows_follow_more() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chain/get_producers"))
        .and(body_partial_json(json!({"lower_bound": "", "limit": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [
                {"owner": "alice", "is_active": 1, "url": "https://alice.example", "location": 840},
                {"owner": "bob", "is_active": 0, "url": "", "location": 0}
            ],
            "more": "carol"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chain/get_producers"))
        .and(body_partial_json(json!({"lower_bound": "carol"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [{"owner": "carol", "is_active": true, "url": "https://carol.example", "location": "276"}],
            "more": ""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client(&server).producer_rows(2).await.unwrap();
    let owners: Vec<&str> = rows.iter().map(|r| r.owner.as_str()).collect();
    assert_eq!(owners, ["alice", "bob", "carol"]);
    assert_eq!(rows[0].location, "840");
    assert!(!rows[1].is_active);
    assert_eq!(rows[1].location, "");
    assert_eq!(rows[2].location, "276");
}

#[tokio::test]
async fn schedule_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chain/get_producer_schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": {"version": 7, "producers": [
                {"producer_name": "zeta", "authority": []},
                {"producer_name": "alpha", "authority": []}
            ]}
        })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).top21().await.unwrap(), ["zeta", "alpha"]);
}

#[tokio::test]
async fn failed_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chain/get_producer_schedule"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server).top21().await.unwrap_err();
    assert!(err.to_string().contains("500"), "{err}");
}

#[tokio::test]
async fn producerjson_actions_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/history/get_actions"))
        .and(query_param("act.account", "producerjson"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"actions":[]}"#))
        .mount(&server)
        .await;

    let body = client(&server).producerjson_actions(1000).await.unwrap();
    assert_eq!(body, br#"{"actions":[]}"#);
}

#[tokio::test]
async fn conditional_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bp.json"))
        .and(header_exists("if-modified-since"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bp.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                .set_body_raw(r#"{"nodes":[]}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/bp.json", server.uri());
    let client = client(&server);

    let fresh = client.fetch_if_modified(&url, None).await.unwrap().unwrap();
    assert_eq!(fresh.bytes, br#"{"nodes":[]}"#);
    assert_eq!(fresh.content_type.as_deref(), Some("application/json"));
    assert_eq!(
        fresh.last_modified,
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480))
    );

    let cached = client
        .fetch_if_modified(&url, Some(SystemTime::now()))
        .await
        .unwrap();
    assert!(cached.is_none());
}

#[tokio::test]
async fn last_modified_from_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("last-modified", "Thu, 01 Jan 1970 00:01:40 GMT"),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/bare.png"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client
            .last_modified(&format!("{}/logo.png", server.uri()))
            .await
            .unwrap(),
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(100))
    );
    assert_eq!(
        client
            .last_modified(&format!("{}/bare.png", server.uri()))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hyperion/v2/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"health": []})))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.answers(&format!("{}/hyperion/", server.uri())).await);
    assert!(!client.answers(&format!("{}/plain", server.uri())).await);
    assert!(!client.answers("http://127.0.0.1:9").await);
}
