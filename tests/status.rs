//! Status endpoint over the router, without binding a socket
//!
//! Run with: `cargo test --test status`

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mc_tether::status::{router, StatusState};
use mc_tether::{Controller, MemorySessionClient, Position, Target};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn target() -> Target {
    Target {
        host: "mc.example.net".into(),
        port: 25565,
        username: "bot".into(),
        auth: "microsoft".into(),
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_status_json_follows_controller() {
    let client = MemorySessionClient::new();
    let controller = Controller::spawn(Arc::new(client.clone()), target());
    let state = StatusState::new(controller.subscribe(), target());

    let (status, body) = get(router(state.clone()), "/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["connected"], false);
    assert_eq!(json["isConnecting"], false);
    assert_eq!(json["server"], "mc.example.net");
    assert_eq!(json["port"], 25565);
    assert_eq!(json["username"], "bot");
    assert!(json["uptime"].as_f64().unwrap() >= 0.0);

    controller.connect().await.unwrap();
    let (_, body) = get(router(state.clone()), "/status").await;
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["isConnecting"], true);

    client.latest().unwrap().spawned(Position::new(1, 64, 1));
    controller.inspect().await.unwrap();
    let (_, body) = get(router(state), "/status").await;
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["connected"], true);
    assert_eq!(json["isConnecting"], false);
}

#[tokio::test]
async fn test_index_page() {
    let controller = Controller::spawn(Arc::new(MemorySessionClient::new()), target());
    let state = StatusState::new(controller.subscribe(), target());

    let (status, body) = get(router(state), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Disconnected"));
    assert!(body.contains("mc.example.net:25565"));
    assert!(body.contains("<strong>Username:</strong> bot"));
    assert!(body.contains("0h 0m"));
}

#[tokio::test]
async fn test_unknown_route() {
    let controller = Controller::spawn(Arc::new(MemorySessionClient::new()), target());
    let state = StatusState::new(controller.subscribe(), target());

    let (status, _) = get(router(state), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
