//! Keyword and flagged-object rule repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{ChatKeywordDbModel, FlaggedObjectDbModel};
use crate::{Error, Result};

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn create_keyword(&self, keyword: &ChatKeywordDbModel) -> Result<()>;
    async fn find_keyword(&self, id: &str) -> Result<Option<ChatKeywordDbModel>>;
    async fn list_keywords(&self) -> Result<Vec<ChatKeywordDbModel>>;
    async fn update_keyword(&self, id: &str, keyword: &str) -> Result<()>;
    async fn delete_keyword(&self, id: &str) -> Result<()>;

    async fn create_object(&self, object: &FlaggedObjectDbModel) -> Result<()>;
    async fn find_object(&self, id: &str) -> Result<Option<FlaggedObjectDbModel>>;
    async fn list_objects(&self) -> Result<Vec<FlaggedObjectDbModel>>;
    async fn update_object(&self, id: &str, object_name: &str) -> Result<()>;
    async fn delete_object(&self, id: &str) -> Result<()>;
}

pub struct SqlxRuleRepository {
    pool: SqlitePool,
}

impl SqlxRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_unique(entity: &str, value: &str, err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::duplicate(entity, value)
        }
        e => e.into(),
    }
}

#[async_trait]
impl RuleRepository for SqlxRuleRepository {
    async fn create_keyword(&self, keyword: &ChatKeywordDbModel) -> Result<()> {
        sqlx::query("INSERT INTO chat_keywords (id, keyword, created_at) VALUES (?, ?, ?)")
            .bind(&keyword.id)
            .bind(&keyword.keyword)
            .bind(keyword.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique("Keyword", &keyword.keyword, e))?;
        Ok(())
    }

    async fn find_keyword(&self, id: &str) -> Result<Option<ChatKeywordDbModel>> {
        let keyword =
            sqlx::query_as::<_, ChatKeywordDbModel>("SELECT * FROM chat_keywords WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(keyword)
    }

    async fn list_keywords(&self) -> Result<Vec<ChatKeywordDbModel>> {
        let keywords = sqlx::query_as::<_, ChatKeywordDbModel>(
            "SELECT * FROM chat_keywords ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(keywords)
    }

    async fn update_keyword(&self, id: &str, keyword: &str) -> Result<()> {
        let done = sqlx::query("UPDATE chat_keywords SET keyword = ? WHERE id = ?")
            .bind(keyword)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique("Keyword", keyword, e))?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Keyword", id));
        }
        Ok(())
    }

    async fn delete_keyword(&self, id: &str) -> Result<()> {
        let done = sqlx::query("DELETE FROM chat_keywords WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Keyword", id));
        }
        Ok(())
    }

    async fn create_object(&self, object: &FlaggedObjectDbModel) -> Result<()> {
        sqlx::query("INSERT INTO flagged_objects (id, object_name, created_at) VALUES (?, ?, ?)")
            .bind(&object.id)
            .bind(&object.object_name)
            .bind(object.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique("Object", &object.object_name, e))?;
        Ok(())
    }

    async fn find_object(&self, id: &str) -> Result<Option<FlaggedObjectDbModel>> {
        let object =
            sqlx::query_as::<_, FlaggedObjectDbModel>("SELECT * FROM flagged_objects WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(object)
    }

    async fn list_objects(&self) -> Result<Vec<FlaggedObjectDbModel>> {
        let objects = sqlx::query_as::<_, FlaggedObjectDbModel>(
            "SELECT * FROM flagged_objects ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(objects)
    }

    async fn update_object(&self, id: &str, object_name: &str) -> Result<()> {
        let done = sqlx::query("UPDATE flagged_objects SET object_name = ? WHERE id = ?")
            .bind(object_name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique("Object", object_name, e))?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Object", id));
        }
        Ok(())
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        let done = sqlx::query("DELETE FROM flagged_objects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Object", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    async fn setup() -> SqlxRuleRepository {
        let pool = database::init_pool_with_size("sqlite::memory:", 1)
            .await
            .unwrap();
        database::run_migrations(&pool).await.unwrap();
        SqlxRuleRepository::new(pool)
    }

    #[tokio::test]
    async fn test_keyword_crud() {
        let repo = setup().await;
        let kw = ChatKeywordDbModel::new("gun");
        repo.create_keyword(&kw).await.unwrap();

        let err = repo
            .create_keyword(&ChatKeywordDbModel::new("gun"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));

        repo.update_keyword(&kw.id, "rifle").await.unwrap();
        let listed = repo.list_keywords().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].keyword, "rifle");

        repo.delete_keyword(&kw.id).await.unwrap();
        assert!(repo.list_keywords().await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_keyword(&kw.id).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_object_rename_to_existing_is_duplicate() {
        let repo = setup().await;
        let knife = FlaggedObjectDbModel::new("knife");
        let gun = FlaggedObjectDbModel::new("gun");
        repo.create_object(&knife).await.unwrap();
        repo.create_object(&gun).await.unwrap();

        let err = repo.update_object(&gun.id, "knife").await.unwrap_err();
        assert!(err.is_unique_violation());

        let names: Vec<_> = repo
            .list_objects()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.object_name)
            .collect();
        assert_eq!(names, vec!["knife", "gun"]);
    }

    #[tokio::test]
    async fn test_keywords_listed_in_insertion_order() {
        let repo = setup().await;
        for word in ["knife", "gun", "bomb"] {
            repo.create_keyword(&ChatKeywordDbModel::new(word))
                .await
                .unwrap();
        }

        let listed: Vec<_> = repo
            .list_keywords()
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.keyword)
            .collect();
        assert_eq!(listed, vec!["knife", "gun", "bomb"]);
    }
}
