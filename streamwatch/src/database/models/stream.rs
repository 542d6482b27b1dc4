//! Stream target database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::StreamUrl;

/// A monitored stream. `room_url` is unique and is what monitor loops key on.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StreamDbModel {
    pub id: String,
    pub room_url: String,
    /// Display name of the hosting platform, derived from the URL.
    pub platform: String,
    /// Room owner parsed from the URL path.
    pub streamer_username: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StreamDbModel {
    pub fn new(url: &StreamUrl) -> Self {
        let now = crate::database::time::now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            room_url: url.as_str().to_string(),
            platform: url.platform(),
            streamer_username: url.streamer_username().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the display fields. The URL stays as created.
    pub fn set_display(&mut self, platform: Option<&str>, streamer_username: Option<&str>) {
        if let Some(platform) = platform {
            self.platform = platform.to_string();
        }
        if let Some(username) = streamer_username {
            self.streamer_username = username.to_string();
        }
        self.updated_at = crate::database::time::now_ms();
    }

    pub fn url(&self) -> StreamUrl {
        StreamUrl::from_trusted(self.room_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_derives_display_fields() {
        let url = StreamUrl::new("https://chaturbate.com/alice/").unwrap();
        let stream = StreamDbModel::new(&url);
        assert_eq!(stream.room_url, "https://chaturbate.com/alice");
        assert_eq!(stream.platform, "Chaturbate");
        assert_eq!(stream.streamer_username, "alice");
    }

    #[test]
    fn test_set_display_keeps_url() {
        let mut stream = StreamDbModel::new(&StreamUrl::new("https://chaturbate.com/alice").unwrap());
        stream.set_display(None, Some("Alice B"));
        assert_eq!(stream.platform, "Chaturbate");
        assert_eq!(stream.streamer_username, "Alice B");
        assert_eq!(stream.url().as_str(), "https://chaturbate.com/alice");
    }
}
