// Periodic leaderboard: reads the top scores and broadcasts them to every
// connection. Runs on its own timer and never touches the world lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{Database, ScoreEntry};
use crate::engine::protocol::{LeaderboardEntry, ServerMessage};
use crate::engine::server::GameServer;
use crate::metrics;

impl From<&ScoreEntry> for LeaderboardEntry {
    fn from(entry: &ScoreEntry) -> Self {
        LeaderboardEntry {
            name: entry.name.clone(),
            score: entry.score,
            date: entry.created_at.clone(),
        }
    }
}

/// Top `limit` entries, highest score first.
pub async fn top_entries(db: &Database, limit: i64) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
    let rows = db.top_scores(limit).await?;
    Ok(rows.iter().map(LeaderboardEntry::from).collect())
}

/// Query the leaderboard and broadcast it. Returns the number of entries sent.
pub async fn publish_leaderboard(
    db: &Database,
    server: &GameServer,
    limit: i64,
) -> Result<usize, sqlx::Error> {
    let entries = top_entries(db, limit).await?;
    let count = entries.len();
    server.broadcast(&ServerMessage::Leaderboard { entries });
    metrics::LEADERBOARD_BROADCASTS_TOTAL.inc();
    Ok(count)
}

/// Spawn the leaderboard timer. A failed query is logged and that round is
/// skipped; the timer keeps running. Rounds that fall behind are skipped
/// rather than bunched up.
pub fn spawn_leaderboard_loop(
    db: Arc<Database>,
    server: Arc<GameServer>,
    every: Duration,
    limit: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; wait one full period instead.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let started = Instant::now();
            match publish_leaderboard(&db, &server, limit).await {
                Ok(count) => tracing::debug!("Leaderboard broadcast with {count} entries"),
                Err(e) => {
                    metrics::LEADERBOARD_FAILURES_TOTAL.inc();
                    tracing::warn!("Leaderboard query failed: {e}");
                }
            }
            let elapsed = started.elapsed();
            if elapsed > every {
                tracing::warn!(
                    "Leaderboard round took {:?}, longer than the {:?} interval",
                    elapsed,
                    every
                );
            }
        }
    })
}
