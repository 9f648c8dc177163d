use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, CONTENT_TYPE, ORIGIN,
            RETRY_AFTER,
        },
        Method, Request, StatusCode,
    },
    response::Response,
    Router,
};
use notebox_core::{db::open_db_in_memory, KeyStrategy, RateLimitConfig};
use notebox_http::{build_router, AppConfig, AppState, NoteStore};
use serde_json::{json, Value};
use tower::ServiceExt;

const ORIGIN_OK: &str = "http://localhost:5173";
// Wide enough that a test run never straddles an epoch-aligned boundary.
const LONG_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

struct TestApp {
    router: Router,
    store: NoteStore,
}

fn test_app(config: AppConfig) -> TestApp {
    let store = NoteStore::new(open_db_in_memory().unwrap(), config.storage_timeout);
    let router = build_router(AppState::new(store.clone(), config)).unwrap();
    TestApp { router, store }
}

fn default_app() -> TestApp {
    test_app(AppConfig::default())
}

fn limited_app(max_requests: u32, keys: KeyStrategy) -> TestApp {
    test_app(AppConfig {
        rate_limit: RateLimitConfig {
            max_requests,
            window: LONG_WINDOW,
        },
        rate_limit_key: keys,
        ..AppConfig::default()
    })
}

fn peer(last_octet: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)), 40_000)
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn from_peer(mut req: Request<Body>, addr: SocketAddr) -> Request<Body> {
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn send_json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(req).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    async fn create(&self, title: &str, content: &str) -> Value {
        let (status, body) = self
            .send_json(request(
                Method::POST,
                "/api/notes",
                Some(json!({ "title": title, "content": content })),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_get_delete_then_missing() {
    let app = default_app();

    let created = app.create("A", "B").await;
    assert_eq!(created["title"], "A");
    assert_eq!(created["content"], "B");
    assert_eq!(created["createdAt"], created["updatedAt"]);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = app
        .send_json(request(Method::GET, &format!("/api/notes/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, body) = app
        .send_json(request(Method::DELETE, &format!("/api/notes/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Note deleted successfully" }));

    let (status, body) = app
        .send_json(request(Method::GET, &format!("/api/notes/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "Note not found" }));

    let (status, _) = app
        .send_json(request(Method::DELETE, &format!("/api/notes/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_starts_empty() {
    let app = default_app();

    let (status, body) = app
        .send_json(request(Method::GET, "/api/notes", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn missing_or_empty_fields_are_bad_requests() {
    let app = default_app();

    let (status, body) = app
        .send_json(request(
            Method::POST,
            "/api/notes",
            Some(json!({ "title": "only a title" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "content is required" }));

    let (status, body) = app
        .send_json(request(
            Method::POST,
            "/api/notes",
            Some(json!({ "title": "", "content": "x" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "title is required" }));

    let (_, listed) = app
        .send_json(request(Method::GET, "/api/notes", None))
        .await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn whitespace_only_title_is_accepted() {
    let app = default_app();

    let created = app.create(" ", "2%").await;
    assert_eq!(created["title"], " ");
}

#[tokio::test]
async fn update_with_empty_fields_is_bad_request() {
    let app = default_app();
    let created = app.create("keep", "me").await;
    let id = created["id"].as_str().unwrap();
    let uri = format!("/api/notes/{id}");

    let (status, body) = app
        .send_json(request(
            Method::PUT,
            &uri,
            Some(json!({ "title": "changed", "content": "" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "content is required" }));

    let (status, _) = app
        .send_json(request(Method::PUT, &uri, Some(json!({ "content": "x" }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let malformed = Request::builder()
        .method(Method::PUT)
        .uri(&uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"title\": "))
        .unwrap();
    let (status, body) = app.send_json(malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, fetched) = app.send_json(request(Method::GET, &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = default_app();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/notes")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send_json(req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn non_uuid_ids_are_not_found() {
    let app = default_app();

    let (status, body) = app
        .send_json(request(Method::GET, "/api/notes/not-a-uuid", None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "Note not found" }));
}

#[tokio::test]
async fn updating_a_missing_note_is_not_found() {
    let app = default_app();

    let (status, _) = app
        .send_json(request(
            Method::PUT,
            "/api/notes/7f0c2a51-55c4-4bb8-8f0a-2f9cf1f3f0a1",
            Some(json!({ "title": "t", "content": "c" })),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_moves_note_to_front_of_list() {
    let app = default_app();

    let first = app.create("first", "1").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = app.create("second", "2").await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let (_, listed) = app
        .send_json(request(Method::GET, "/api/notes", None))
        .await;
    assert_eq!(listed[0]["id"], second["id"]);
    assert_eq!(listed[1]["id"], first["id"]);

    let id = first["id"].as_str().unwrap();
    let (status, updated) = app
        .send_json(request(
            Method::PUT,
            &format!("/api/notes/{id}"),
            Some(json!({ "title": "first, edited", "content": "1b" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "first, edited");
    assert_eq!(updated["createdAt"], first["createdAt"]);
    assert_ne!(updated["updatedAt"], first["updatedAt"]);

    let (_, listed) = app
        .send_json(request(Method::GET, "/api/notes", None))
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
    assert_eq!(listed[0]["id"], first["id"]);
    assert_eq!(listed[1]["id"], second["id"]);
}

#[tokio::test]
async fn allowed_requests_carry_rate_limit_headers() {
    let app = limited_app(3, KeyStrategy::PerIp);

    let response = app
        .send(from_peer(request(Method::GET, "/api/notes", None), peer(1)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
    assert!(response.headers().contains_key("x-ratelimit-reset"));
}

#[tokio::test]
async fn requests_over_the_threshold_get_429() {
    let app = limited_app(2, KeyStrategy::PerIp);

    for _ in 0..2 {
        let response = app
            .send(from_peer(request(Method::GET, "/api/notes", None), peer(1)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .send(from_peer(request(Method::GET, "/api/notes", None), peer(1)))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= LONG_WINDOW.as_secs());
    assert_eq!(
        json_body(response).await,
        json!({ "message": "Too many requests, please try again later" })
    );

    // The rejected request never reached the handler.
    let response = app
        .send(from_peer(
            request(
                Method::POST,
                "/api/notes",
                Some(json!({ "title": "t", "content": "c" })),
            ),
            peer(1),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app
        .send(from_peer(request(Method::GET, "/api/notes", None), peer(2)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn global_key_shares_one_budget() {
    let app = limited_app(2, KeyStrategy::Global);

    let first = app
        .send(from_peer(request(Method::GET, "/api/notes", None), peer(1)))
        .await;
    let second = app
        .send(from_peer(request(Method::GET, "/api/notes", None), peer(2)))
        .await;
    let third = app
        .send(from_peer(request(Method::GET, "/api/notes", None), peer(3)))
        .await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn foreign_origins_are_forbidden() {
    let app = default_app();

    let req = Request::builder()
        .uri("/api/notes")
        .header(ORIGIN, "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send_json(req).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "message": "Origin not allowed" }));
}

#[tokio::test]
async fn allowed_origin_gets_cors_headers() {
    let app = default_app();

    let req = Request::builder()
        .uri("/api/notes")
        .header(ORIGIN, ORIGIN_OK)
        .body(Body::empty())
        .unwrap();
    let response = app.send(req).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN_OK);
}

#[tokio::test]
async fn preflight_is_answered_for_allowed_origin() {
    let app = default_app();

    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/notes")
        .header(ORIGIN, ORIGIN_OK)
        .header(ACCESS_CONTROL_REQUEST_METHOD, "PUT")
        .body(Body::empty())
        .unwrap();
    let response = app.send(req).await;

    assert!(response.status().is_success());
    assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN_OK);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = default_app();

    let (status, body) = app
        .send_json(request(Method::GET, "/api/nothing-here", None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "Route not found" }));
}

#[tokio::test]
async fn health_reports_ok() {
    let app = default_app();

    let (status, body) = app
        .send_json(request(Method::GET, "/api/health", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn closed_store_yields_internal_error() {
    let app = default_app();
    app.store.close().unwrap();

    let (status, body) = app
        .send_json(request(Method::GET, "/api/notes", None))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Internal server error" }));
}
