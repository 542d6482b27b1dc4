//! Stream repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::StreamDbModel;
use crate::{Error, Result};

#[async_trait]
pub trait StreamRepository: Send + Sync {
    /// Insert a stream. A known room URL yields `Error::Duplicate`.
    async fn create(&self, stream: &StreamDbModel) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<StreamDbModel>>;
    async fn find_by_url(&self, room_url: &str) -> Result<Option<StreamDbModel>>;
    async fn list(&self) -> Result<Vec<StreamDbModel>>;
    /// Persist the display fields. `room_url` is never rewritten.
    async fn update(&self, stream: &StreamDbModel) -> Result<()>;
    /// Delete a stream. Assignments cascade; past events keep the URL string.
    async fn delete(&self, id: &str) -> Result<()>;
}

pub struct SqlxStreamRepository {
    pool: SqlitePool,
}

impl SqlxStreamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamRepository for SqlxStreamRepository {
    async fn create(&self, stream: &StreamDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO streams (id, room_url, platform, streamer_username, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stream.id)
        .bind(&stream.room_url)
        .bind(&stream.platform)
        .bind(&stream.streamer_username)
        .bind(stream.created_at)
        .bind(stream.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::duplicate("Stream", &stream.room_url))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StreamDbModel>> {
        let stream = sqlx::query_as::<_, StreamDbModel>("SELECT * FROM streams WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stream)
    }

    async fn find_by_url(&self, room_url: &str) -> Result<Option<StreamDbModel>> {
        let stream = sqlx::query_as::<_, StreamDbModel>("SELECT * FROM streams WHERE room_url = ?")
            .bind(room_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stream)
    }

    async fn list(&self) -> Result<Vec<StreamDbModel>> {
        let streams = sqlx::query_as::<_, StreamDbModel>(
            "SELECT * FROM streams ORDER BY created_at ASC, room_url ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(streams)
    }

    async fn update(&self, stream: &StreamDbModel) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE streams SET
                platform = ?,
                streamer_username = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&stream.platform)
        .bind(&stream.streamer_username)
        .bind(stream.updated_at)
        .bind(&stream.id)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(Error::not_found("Stream", &stream.id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let done = sqlx::query("DELETE FROM streams WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Stream", id));
        }
        Ok(())
    }
}
