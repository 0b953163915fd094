use std::sync::Arc;

use coinrush_backend::api::{self, AppState};
use coinrush_backend::config::Config;
use coinrush_backend::db::Database;
use coinrush_backend::engine::server::GameServer;
use coinrush_backend::leaderboard::spawn_leaderboard_loop;
use coinrush_backend::metrics;
use coinrush_backend::persistence::{spawn_persistence_worker, warm_sessions, PersistenceHandle};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let (persistence, jobs) = PersistenceHandle::channel(config.persist_queue_capacity);
    spawn_persistence_worker(db.clone(), jobs);

    let game_server = Arc::new(GameServer::new(config.game.clone(), persistence));

    match warm_sessions(&db, game_server.sessions()).await {
        Ok(n) => tracing::info!("Loaded {n} persisted sessions"),
        Err(e) => tracing::warn!("Could not load persisted sessions: {e}"),
    }

    game_server.spawn_tick_loop();
    spawn_leaderboard_loop(
        db.clone(),
        game_server.clone(),
        config.leaderboard_interval,
        config.leaderboard_size,
    );

    let state = AppState {
        db,
        game_server,
        leaderboard_size: config.leaderboard_size,
    };
    let app = api::router(state, config.static_dir.clone());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(
        "Coinrush backend listening on port {} ({}x{} world, {} Hz)",
        config.port,
        config.game.width,
        config.game.height,
        config.game.tick_rate
    );
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
