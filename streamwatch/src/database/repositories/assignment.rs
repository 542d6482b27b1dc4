//! Assignment repository.
//!
//! `(agent_id, stream_id)` uniqueness is enforced by the table constraint, so
//! concurrent assign requests cannot both succeed.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{AssignmentDbModel, AssignmentView};
use crate::{Error, Result};

const VIEW_SELECT: &str = r#"
    SELECT
        a.id AS assignment_id,
        s.id AS stream_id,
        s.room_url AS room_url,
        s.platform AS platform,
        s.streamer_username AS streamer_username,
        u.id AS agent_id,
        u.username AS agent_username,
        a.created_at AS created_at
    FROM assignments a
    INNER JOIN streams s ON s.id = a.stream_id
    INNER JOIN users u ON u.id = a.agent_id
"#;

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Insert an assignment. An existing pair yields `Error::Duplicate`.
    async fn create(&self, assignment: &AssignmentDbModel) -> Result<()>;
    async fn exists(&self, agent_id: &str, stream_id: &str) -> Result<bool>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// All assignments joined with stream and agent rows.
    async fn list_views(&self) -> Result<Vec<AssignmentView>>;
    async fn list_views_for_agent(&self, agent_id: &str) -> Result<Vec<AssignmentView>>;
    /// Distinct room URLs referenced by at least one assignment.
    async fn distinct_stream_urls(&self) -> Result<Vec<String>>;
    async fn count(&self) -> Result<i64>;
}

pub struct SqlxAssignmentRepository {
    pool: SqlitePool,
}

impl SqlxAssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentRepository for SqlxAssignmentRepository {
    async fn create(&self, assignment: &AssignmentDbModel) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO assignments (id, agent_id, stream_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&assignment.id)
        .bind(&assignment.agent_id)
        .bind(&assignment.stream_id)
        .bind(assignment.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                Error::duplicate(
                    "Assignment",
                    format!("{}/{}", assignment.agent_id, assignment.stream_id),
                ),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, agent_id: &str, stream_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM assignments WHERE agent_id = ? AND stream_id = ?")
                .bind(agent_id)
                .bind(stream_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let done = sqlx::query("DELETE FROM assignments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Assignment", id));
        }
        Ok(())
    }

    async fn list_views(&self) -> Result<Vec<AssignmentView>> {
        let sql = format!("{VIEW_SELECT} ORDER BY a.created_at ASC, a.id ASC");
        let views = sqlx::query_as::<_, AssignmentView>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(views)
    }

    async fn list_views_for_agent(&self, agent_id: &str) -> Result<Vec<AssignmentView>> {
        let sql = format!("{VIEW_SELECT} WHERE a.agent_id = ? ORDER BY a.created_at ASC, a.id ASC");
        let views = sqlx::query_as::<_, AssignmentView>(&sql)
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(views)
    }

    async fn distinct_stream_urls(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT s.room_url
            FROM assignments a
            INNER JOIN streams s ON s.id = a.stream_id
            ORDER BY s.room_url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    async fn count(&self) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assignments")
            .fetch_one(&self.pool)
            .await?;
        Ok(result.0)
    }
}
