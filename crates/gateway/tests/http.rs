mod common;

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use fg_domain::config::{Config, WindowLimit};
use fg_gateway::api;

use common::Harness;

fn app(h: &Harness) -> Router {
    api::router(h.state.clone()).with_state(h.state.clone())
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let mut h = Harness::new(Config::default(), Vec::new());
    h.state.api_token_hash = Some(Sha256::digest(b"s3cret").to_vec());

    let response = app(&h)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn facade_requires_the_bearer_token_when_configured() {
    let mut h = Harness::new(Config::default(), Vec::new());
    h.state.api_token_hash = Some(Sha256::digest(b"s3cret").to_vec());

    let denied = app(&h)
        .oneshot(post("/v1/memories", r#"{"cmd":"list"}"#))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut request = post("/v1/memories", r#"{"cmd":"list"}"#);
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    let allowed = app(&h).oneshot(request).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    let envelope = body_json(allowed).await;
    assert_eq!(envelope["ok"], true);
    assert_eq!(envelope["cmd"], "list");
    assert_eq!(envelope["count"], 0);
}

#[tokio::test]
async fn error_codes_map_to_http_statuses() {
    let h = Harness::new(Config::default(), Vec::new());

    let unknown = app(&h)
        .oneshot(post("/v1/weather", r#"{"cmd":"get"}"#))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    let envelope = body_json(unknown).await;
    assert_eq!(envelope["ok"], false);
    assert!(envelope["error"].as_str().unwrap().starts_with("not_found: "));

    let malformed = app(&h).oneshot(post("/v1/memories", "{not json")).await.unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let envelope = body_json(malformed).await;
    assert!(envelope["error"].as_str().unwrap().starts_with("invalid_input: "));
}

#[tokio::test]
async fn disabled_domain_is_forbidden() {
    let mut config = Config::default();
    config.domains.search = false;
    let h = Harness::new(config, Vec::new());

    let response = app(&h)
        .oneshot(post("/v1/search", r#"{"cmd":"query","params":{"query":"x"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn throttled_calls_carry_retry_after_per_caller() {
    let mut config = Config::default();
    config.rate_limits.classes = HashMap::from([(
        "memories".to_string(),
        WindowLimit {
            limit: 1,
            window_secs: 30,
        },
    )]);
    let h = Harness::new(config, Vec::new());

    let as_caller = |caller: &str| {
        let mut request = post("/v1/memories", r#"{"cmd":"list"}"#);
        request
            .headers_mut()
            .insert(api::identity::CALLER_HEADER, caller.parse().unwrap());
        request
    };

    let first = app(&h).oneshot(as_caller("alice")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app(&h).oneshot(as_caller("alice")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = second.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=30).contains(&retry_after));
    let envelope = body_json(second).await;
    assert!(envelope["error"].as_str().unwrap().starts_with("rate_limited: "));

    let bob = app(&h).oneshot(as_caller("bob")).await.unwrap();
    assert_eq!(bob.status(), StatusCode::OK);
}

#[tokio::test]
async fn domains_listing_reports_switches() {
    let mut config = Config::default();
    config.domains.code = false;
    let h = Harness::new(config, Vec::new());

    let response = app(&h)
        .oneshot(Request::builder().uri("/v1/domains").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    let domains = listing["domains"].as_array().unwrap();
    assert_eq!(domains.len(), 8);
    let code = domains.iter().find(|d| d["name"] == "code").unwrap();
    assert_eq!(code["enabled"], false);
    assert!(code["commands"]
        .as_array()
        .unwrap()
        .contains(&json!("run")));
}
