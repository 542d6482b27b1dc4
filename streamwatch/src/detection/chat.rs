//! Chat detector: scan recent chat messages for keywords.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Detector, DetectorError, Finding};
use crate::config::RuleSnapshot;
use crate::database::models::EventCategory;
use crate::domain::StreamUrl;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub author: Option<String>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            author: None,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Source of chat messages for a stream.
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Up to `limit` most recent messages, oldest first.
    async fn recent_messages(
        &self,
        stream: &StreamUrl,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, DetectorError>;
}

pub struct ChatDetector {
    source: Arc<dyn ChatSource>,
    window: usize,
}

impl ChatDetector {
    pub fn new(source: Arc<dyn ChatSource>, window: usize) -> Self {
        Self {
            source,
            window: window.max(1),
        }
    }
}

#[async_trait]
impl Detector for ChatDetector {
    fn category(&self) -> EventCategory {
        EventCategory::Chat
    }

    async fn detect(
        &self,
        stream: &StreamUrl,
        rules: &RuleSnapshot,
    ) -> Result<Option<Finding>, DetectorError> {
        if rules.keywords.is_empty() {
            return Ok(None);
        }

        let messages = self.source.recent_messages(stream, self.window).await?;
        for message in &messages {
            if let Some(keyword) = rules.match_keyword(&message.text) {
                return Ok(Some(Finding::new(format!(
                    "Chat flagged: {} in '{}'",
                    keyword, message.text
                ))));
            }
        }
        Ok(None)
    }
}
