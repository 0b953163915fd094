// HTTP routes: health, leaderboard, metrics, and the game WebSocket.

pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::db::Database;
use crate::engine::server::GameServer;
use crate::leaderboard;
use crate::metrics;

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub game_server: Arc<GameServer>,
    pub leaderboard_size: i64,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/leaderboard", get(get_leaderboard))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws::ws_game))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => {
            tracing::info!("Serving static files from {}", dir.display());
            app.fallback_service(ServeDir::new(dir))
        }
        None => app,
    };

    app.layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "coinrush-backend",
        "players": state.game_server.player_count(),
    }))
}

async fn get_leaderboard(State(state): State<AppState>) -> impl IntoResponse {
    match leaderboard::top_entries(&state.db, state.leaderboard_size).await {
        Ok(top) => (StatusCode::OK, Json(json!({ "ok": true, "top": top }))).into_response(),
        Err(e) => {
            tracing::error!("Database error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": "db error" })),
            )
                .into_response()
        }
    }
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics::gather_metrics(),
    )
}
