use std::net::SocketAddr;
use std::sync::Arc;

use api_adapters::dto::{PostView, TallyView};
use api_adapters::{router, AppState, Metrics};
use auth_adapters::AddressIdentityResolver;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use domains::{
    BoardStore, Identity, IdentityKey, MockCaptchaVerifier, MockReputationChecker, NewPost, PostId,
    SystemClock,
};
use serde_json::{json, Value};
use services::{BoardService, ContentFilter, IdentityLedger, LedgerPolicy, ReputationGate};
use storage_adapters::InMemoryBoardStore;
use tower::ServiceExt;

const SEEDER: &str = "198.51.100.50";
const CALLER: &str = "203.0.113.5";

fn app(store: &InMemoryBoardStore, forwarded_header: Option<&'static str>) -> Router {
    let mut reputation = MockReputationChecker::new();
    reputation
        .expect_score()
        .returning(|address| Ok(if address.as_str() == "192.0.2.66" { 0.99 } else { 0.0 }));
    let mut captcha = MockCaptchaVerifier::new();
    captcha.expect_verify().returning(|token| Ok(token == "solved"));

    let board = BoardService::new(
        Arc::new(store.clone()),
        ReputationGate::new(Arc::new(reputation), Arc::new(captcha), 0.90),
        ContentFilter::new(["casino"], "££", IdentityKey::new("1.1.1.1")),
        IdentityLedger::new(LedgerPolicy { captcha_probability: 0.0, ..LedgerPolicy::default() }),
        Arc::new(SystemClock),
    );
    router(Arc::new(AppState {
        board,
        resolver: Arc::new(AddressIdentityResolver::default()),
        forwarded_header: forwarded_header.map(HeaderName::from_static),
        metrics: Metrics::new(),
    }))
}

async fn seed_thread(store: &InMemoryBoardStore) -> PostId {
    let mut tx = store.begin().await.unwrap();
    tx.insert_identity(&Identity::first_contact(IdentityKey::new(SEEDER)))
        .await
        .unwrap();
    let root = services::thread::append_post(
        tx.as_mut(),
        NewPost {
            timestamp: Utc::now(),
            content: "first!".into(),
            author: IdentityKey::new(SEEDER),
        },
        None,
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    root.id
}

fn from(ip: &str, builder: axum::http::request::Builder, body: Body) -> Request<Body> {
    let mut request = builder.body(body).unwrap();
    let peer: SocketAddr = SocketAddr::new(ip.parse().unwrap(), 51_000);
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

fn verify_request(ip: &str) -> Request<Body> {
    from(ip, Request::get("/api/verify"), Body::empty())
}

fn post_request(ip: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post("/api/post").header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("captcha-token", token);
    }
    from(ip, builder, Body::from(body.to_string()))
}

fn vote_request(ip: &str, post_id: PostId, like: bool) -> Request<Body> {
    from(
        ip,
        Request::post("/api/vote").header("content-type", "application/json"),
        Body::from(json!({ "postId": post_id, "voteAction": like }).to_string()),
    )
}

async fn read_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn verify_post_vote_round() {
    let store = InMemoryBoardStore::new();
    let root = seed_thread(&store).await;
    let app = app(&store, None);

    let response = app.clone().oneshot(verify_request(CALLER)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&read_text(response).await).unwrap();
    assert_eq!(body, json!({ "captchaRequired": true }));

    let response = app
        .clone()
        .oneshot(post_request(CALLER, Some("solved"), json!({ "postContent": "hello", "replyId": 0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let shown: Vec<PostView> = serde_json::from_str(&read_text(response).await).unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].id, root);
    assert_eq!(shown[0].path, format!("/{root}"));
    assert_eq!(shown[0].post_content, "first!");

    let response = app.clone().oneshot(vote_request(CALLER, root, true)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tallies: Vec<TallyView> = serde_json::from_str(&read_text(response).await).unwrap();
    assert_eq!(tallies, vec![TallyView { likes: 1, dislikes: 0, id: root }]);

    let response = app.clone().oneshot(vote_request(CALLER, root, true)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_text(response).await, "User cannot vote on this post");
}

#[tokio::test]
async fn captcha_token_is_required_on_first_post() {
    let store = InMemoryBoardStore::new();
    seed_thread(&store).await;
    let app = app(&store, None);
    app.clone().oneshot(verify_request(CALLER)).await.unwrap();

    let response = app
        .clone()
        .oneshot(post_request(CALLER, None, json!({ "postContent": "hello" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(post_request(CALLER, Some("wrong"), json!({ "postContent": "hello" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(store.post_count().await, 1);
}

#[tokio::test]
async fn proxy_addresses_are_refused() {
    let store = InMemoryBoardStore::new();
    let response = app(&store, None).oneshot(verify_request("192.0.2.66")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(store.identity(&IdentityKey::new("192.0.2.66")).await.is_none());
}

#[tokio::test]
async fn unknown_identity_cannot_post_or_vote() {
    let store = InMemoryBoardStore::new();
    let root = seed_thread(&store).await;
    let app = app(&store, None);

    let response = app
        .clone()
        .oneshot(post_request(CALLER, Some("solved"), json!({ "postContent": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app.oneshot(vote_request(CALLER, root, false)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let store = InMemoryBoardStore::new();
    seed_thread(&store).await;
    let app = app(&store, None);
    app.clone().oneshot(verify_request(CALLER)).await.unwrap();

    let garbage = from(
        CALLER,
        Request::post("/api/vote").header("content-type", "application/json"),
        Body::from("{\"postId\": \"seven\"}"),
    );
    let response = app.clone().oneshot(garbage).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_request(CALLER, Some("solved"), json!({ "postContent": "hi", "replyId": -4 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blacklisted_content_is_rejected() {
    let store = InMemoryBoardStore::new();
    seed_thread(&store).await;
    let app = app(&store, None);
    app.clone().oneshot(verify_request(CALLER)).await.unwrap();

    let response = app
        .oneshot(post_request(CALLER, Some("solved"), json!({ "postContent": "best CASINO odds" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.post_count().await, 1);
}

#[tokio::test]
async fn request_without_address_is_rejected() {
    let store = InMemoryBoardStore::new();
    let request = Request::get("/api/verify").body(Body::empty()).unwrap();
    let response = app(&store, None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forwarded_header_is_honoured_only_when_configured() {
    let store = InMemoryBoardStore::new();
    let forwarded = || {
        from(
            "10.0.0.2",
            Request::get("/api/verify").header("x-real-ip", "198.51.100.77"),
            Body::empty(),
        )
    };

    app(&store, None).oneshot(forwarded()).await.unwrap();
    assert!(store.identity(&IdentityKey::new("10.0.0.2")).await.is_some());
    assert!(store.identity(&IdentityKey::new("198.51.100.77")).await.is_none());

    app(&store, Some("x-real-ip")).oneshot(forwarded()).await.unwrap();
    assert!(store.identity(&IdentityKey::new("198.51.100.77")).await.is_some());
}

#[tokio::test]
async fn metrics_count_outcomes() {
    let store = InMemoryBoardStore::new();
    let app = app(&store, None);
    app.clone().oneshot(verify_request(CALLER)).await.unwrap();
    app.clone().oneshot(verify_request("192.0.2.66")).await.unwrap();

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = read_text(response).await;
    assert!(text.contains(r#"dialect_requests_total{operation="verify",outcome="ok"} 1"#));
    assert!(text.contains(r#"dialect_requests_total{operation="verify",outcome="forbidden"} 1"#));
}

#[tokio::test]
async fn health_check_answers() {
    let store = InMemoryBoardStore::new();
    let response = app(&store, None)
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_text(response).await, "ok");
}
