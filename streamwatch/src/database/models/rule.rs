//! Detector rule models: chat/audio keywords and flagged visual objects.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A keyword matched against chat messages and audio transcripts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChatKeywordDbModel {
    pub id: String,
    pub keyword: String,
    pub created_at: i64,
}

impl ChatKeywordDbModel {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            keyword: keyword.into(),
            created_at: crate::database::time::now_ms(),
        }
    }
}

/// An object label the visual detector reports when classified.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FlaggedObjectDbModel {
    pub id: String,
    pub object_name: String,
    pub created_at: i64,
}

impl FlaggedObjectDbModel {
    pub fn new(object_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            object_name: object_name.into(),
            created_at: crate::database::time::now_ms(),
        }
    }
}
