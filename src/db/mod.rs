// Database access layer (SQLite via sqlx).

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Persistent identity for a session, upserted on join, pickup and disconnect.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlayerSession {
    pub session_id: String,
    pub name: String,
    pub last_seen: String,
    pub score: i64,
}

/// One row of the append-only score log.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoreEntry {
    pub id: i64,
    pub name: String,
    pub score: i64,
    pub created_at: String,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_sessions (
                session_id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                last_seen TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                score INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                score INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scores_score ON scores (score DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ── Sessions ──────────────────────────────────────────────────────

    /// Insert or update a session record. With `score: None` an existing
    /// record keeps its stored score (a new one starts at 0).
    pub async fn upsert_session(
        &self,
        session_id: &str,
        name: &str,
        score: Option<i64>,
        last_seen: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO player_sessions (session_id, name, last_seen, score)
            VALUES (?, ?, ?, COALESCE(?, 0))
            ON CONFLICT(session_id) DO UPDATE SET
                name = excluded.name,
                last_seen = excluded.last_seen,
                score = COALESCE(?, player_sessions.score)
            "#,
        )
        .bind(session_id)
        .bind(name)
        .bind(last_seen)
        .bind(score)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PlayerSession>, sqlx::Error> {
        let row = sqlx::query_as::<_, PlayerSession>(
            "SELECT session_id, name, last_seen, score FROM player_sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_sessions(&self) -> Result<Vec<PlayerSession>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PlayerSession>(
            "SELECT session_id, name, last_seen, score FROM player_sessions ORDER BY last_seen",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ── Score log ─────────────────────────────────────────────────────

    pub async fn append_score(
        &self,
        name: &str,
        score: i64,
        created_at: &str,
    ) -> Result<ScoreEntry, sqlx::Error> {
        let row = sqlx::query_as::<_, ScoreEntry>(
            r#"
            INSERT INTO scores (name, score, created_at) VALUES (?, ?, ?)
            RETURNING id, name, score, created_at
            "#,
        )
        .bind(name)
        .bind(score)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Highest scores first; ties keep log order.
    pub async fn top_scores(&self, limit: i64) -> Result<Vec<ScoreEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ScoreEntry>(
            "SELECT id, name, score, created_at FROM scores ORDER BY score DESC, id ASC LIMIT ?",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Close the pool. Later queries fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_session_insert_and_update() {
        let db = test_db().await;

        db.upsert_session("s1", "alice", Some(3), "2024-01-01T00:00:00Z")
            .await
            .unwrap();
        let s = db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(s.name, "alice");
        assert_eq!(s.score, 3);

        db.upsert_session("s1", "alice2", Some(7), "2024-01-02T00:00:00Z")
            .await
            .unwrap();
        let s = db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(s.name, "alice2");
        assert_eq!(s.score, 7);
        assert_eq!(s.last_seen, "2024-01-02T00:00:00Z");

        assert_eq!(db.list_sessions().await.unwrap().len(), 1);
        assert!(db.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_without_score_keeps_stored_score() {
        let db = test_db().await;

        db.upsert_session("s1", "bob", None, "2024-01-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(db.get_session("s1").await.unwrap().unwrap().score, 0);

        db.upsert_session("s1", "bob", Some(5), "2024-01-01T00:01:00Z")
            .await
            .unwrap();
        db.upsert_session("s1", "bobby", None, "2024-01-01T00:02:00Z")
            .await
            .unwrap();
        let s = db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(s.score, 5);
        assert_eq!(s.name, "bobby");
    }

    #[tokio::test]
    async fn test_top_scores_ordering_and_limit() {
        let db = test_db().await;
        for (name, score) in [("a", 3), ("b", 9), ("c", 1), ("d", 9), ("e", 5)] {
            db.append_score(name, score, "2024-01-01T00:00:00Z")
                .await
                .unwrap();
        }
        assert_eq!(db.top_scores(100).await.unwrap().len(), 5);

        let top = db.top_scores(3).await.unwrap();
        let got: Vec<(&str, i64)> = top.iter().map(|e| (e.name.as_str(), e.score)).collect();
        assert_eq!(got, vec![("b", 9), ("d", 9), ("e", 5)]);

        assert!(db.top_scores(0).await.unwrap().is_empty());
        assert!(db.top_scores(-4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_database_errors() {
        let db = test_db().await;
        db.close().await;
        assert!(db.append_score("x", 1, "2024-01-01T00:00:00Z").await.is_err());
    }
}
