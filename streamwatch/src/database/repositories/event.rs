//! Event repository. Events are only ever inserted by monitor loops;
//! `purge_older_than` exists for operator-driven cleanup.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::EventDbModel;
use crate::database::retry::retry_on_sqlite_busy;

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert(&self, event: &EventDbModel) -> Result<()>;
    /// Most recent events across all streams, newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<EventDbModel>>;
    /// Most recent events of one stream, newest first.
    async fn list_for_stream(&self, room_url: &str, limit: i64) -> Result<Vec<EventDbModel>>;
    async fn count_for_stream(&self, room_url: &str) -> Result<i64>;
    async fn count(&self) -> Result<i64>;
    /// Delete events older than `cutoff_ms`. Returns the number removed.
    async fn purge_older_than(&self, cutoff_ms: i64) -> Result<u64>;
}

pub struct SqlxEventRepository {
    pool: SqlitePool,
}

impl SqlxEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn insert(&self, event: &EventDbModel) -> Result<()> {
        retry_on_sqlite_busy("insert_event", || async {
            sqlx::query(
                r#"
                INSERT INTO events (id, timestamp, room_url, category, finding)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.id)
            .bind(event.timestamp)
            .bind(&event.room_url)
            .bind(&event.category)
            .bind(&event.finding)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<EventDbModel>> {
        let events = sqlx::query_as::<_, EventDbModel>(
            "SELECT * FROM events ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn list_for_stream(&self, room_url: &str, limit: i64) -> Result<Vec<EventDbModel>> {
        let events = sqlx::query_as::<_, EventDbModel>(
            "SELECT * FROM events WHERE room_url = ? ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        )
        .bind(room_url)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn count_for_stream(&self, room_url: &str) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events WHERE room_url = ?")
            .bind(room_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(result.0)
    }

    async fn count(&self) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(result.0)
    }

    async fn purge_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let done = sqlx::query("DELETE FROM events WHERE timestamp < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}
