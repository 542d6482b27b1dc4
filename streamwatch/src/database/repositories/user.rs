//! User repository for database operations.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{UserDbModel, UserRole};
use crate::{Error, Result};

/// User repository trait for account data access.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. A taken username yields `Error::Duplicate`.
    async fn create(&self, user: &UserDbModel) -> Result<()>;

    /// Find a user by their unique ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<UserDbModel>>;

    /// Find a user by their username.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserDbModel>>;

    /// List users holding a role, oldest first.
    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserDbModel>>;

    /// Update username and password hash.
    async fn update(&self, user: &UserDbModel) -> Result<()>;

    /// Delete a user by their ID. Assignments cascade.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Count users holding a role.
    async fn count_by_role(&self, role: UserRole) -> Result<i64>;
}

/// SQLx implementation of UserRepository.
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &UserDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::duplicate("Username", &user.username))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserDbModel>> {
        let user = sqlx::query_as::<_, UserDbModel>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserDbModel>> {
        let user = sqlx::query_as::<_, UserDbModel>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserDbModel>> {
        let users = sqlx::query_as::<_, UserDbModel>(
            "SELECT * FROM users WHERE role = ? ORDER BY created_at ASC, username ASC",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update(&self, user: &UserDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = ?,
                password_hash = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(Error::not_found("User", &user.id)),
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::duplicate("Username", &user.username))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let done = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("User", id));
        }
        Ok(())
    }

    async fn count_by_role(&self, role: UserRole) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(result.0)
    }
}
