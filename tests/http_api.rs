// HTTP routes exercised in-process with tower's oneshot.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use coinrush_backend::api::{router, AppState};
use coinrush_backend::db::Database;
use coinrush_backend::engine::config::GameConfig;
use coinrush_backend::engine::server::GameServer;
use coinrush_backend::metrics;
use coinrush_backend::persistence::PersistenceHandle;
use serde_json::Value;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let (handle, _jobs) = PersistenceHandle::channel(16);
    AppState {
        db,
        game_server: Arc::new(GameServer::new(GameConfig::default(), handle)),
        leaderboard_size: 3,
    }
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router(state, None)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(test_state().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["players"], 0);
}

#[tokio::test]
async fn test_leaderboard_returns_top_scores() {
    let state = test_state().await;
    for (name, score) in [("a", 2), ("b", 8), ("c", 5), ("d", 1)] {
        state
            .db
            .append_score(name, score, "2024-02-02T02:02:02.000Z")
            .await
            .unwrap();
    }

    let (status, body) = get(state, "/leaderboard").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], true);
    let top = json["top"].as_array().unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0]["name"], "b");
    assert_eq!(top[1]["name"], "c");
    assert_eq!(top[2]["name"], "a");
    assert_eq!(top[0]["date"], "2024-02-02T02:02:02.000Z");
}

#[tokio::test]
async fn test_leaderboard_db_failure() {
    let state = test_state().await;
    state.db.close().await;
    let (status, body) = get(state, "/leaderboard").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "db error");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    metrics::register_metrics();
    metrics::TICKS_TOTAL.inc();
    let (status, body) = get(test_state().await, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("coinrush_ticks_total"));
}

#[tokio::test]
async fn test_unknown_route_without_static_dir() {
    let (status, _) = get(test_state().await, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
