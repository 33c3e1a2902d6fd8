//! HTTP surface tests: liveness, the streamed chat endpoint, and input
//! validation, all over a real listener.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;

use confab::config::{Config, ProviderKind};
use confab::{ChatEngine, Sessions, Store};

const COMPLETE_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hi \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
    "data: [DONE]\n\n",
);

fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn spawn_upstream() -> String {
    let app = Router::new().route(
        "/chat/completions",
        post(|| async { ([(header::CONTENT_TYPE, "text/event-stream")], COMPLETE_BODY).into_response() }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_confab() -> String {
    let upstream = spawn_upstream().await;
    let store = Arc::new(Store::open_in_memory().unwrap());
    let sessions = Arc::new(Sessions::new());
    let config = Config {
        provider: ProviderKind::OpenAi,
        api_key: Some("test-key".to_string()),
        base_url: upstream,
        model: "test-model".to_string(),
        max_tokens: 128,
        request_timeout: Duration::from_secs(5),
        db_path: "unused.db".into(),
        addr: "127.0.0.1:0".to_string(),
    };
    let engine = Arc::new(ChatEngine::new(store, sessions, config));

    let port = reserve_port();
    let addr = format!("127.0.0.1:{port}");
    let serve_addr = addr.clone();
    tokio::spawn(async move {
        confab::server::serve(engine, &serve_addr).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    format!("http://{addr}")
}

#[tokio::test]
async fn liveness_routes_respond() {
    let base = spawn_confab().await;
    for path in ["/", "/health"] {
        let body: serde_json::Value = reqwest::get(format!("{base}{path}"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "Backend running");
    }
}

#[tokio::test]
async fn chat_endpoint_streams_fragments_then_done() {
    let base = spawn_confab().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/chat"))
        .json(&serde_json::json!({ "message": "Hello", "user": "alice" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(resp
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = resp.text().await.unwrap();
    assert!(body.contains("data: Hi"));
    assert!(body.contains("data: there"));
    assert!(body.contains("event: done"));
    assert!(body.contains("\"complete\":true"));
}

#[tokio::test]
async fn unknown_conversation_is_rejected_before_streaming() {
    let base = spawn_confab().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/chat"))
        .json(&serde_json::json!({ "message": "Hello", "conversation_id": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let base = spawn_confab().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/chat"))
        .json(&serde_json::json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
