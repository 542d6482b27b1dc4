//! Assignment database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Binding of one agent to one stream. Never updated; delete and re-create instead.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AssignmentDbModel {
    pub id: String,
    pub agent_id: String,
    pub stream_id: String,
    pub created_at: i64,
}

impl AssignmentDbModel {
    pub fn new(agent_id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            stream_id: stream_id.into(),
            created_at: crate::database::time::now_ms(),
        }
    }
}

/// Assignment joined with its stream and agent, as shown on dashboards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AssignmentView {
    pub assignment_id: String,
    pub stream_id: String,
    pub room_url: String,
    pub platform: String,
    pub streamer_username: String,
    pub agent_id: String,
    pub agent_username: String,
    pub created_at: i64,
}
