//! Log notification channel.

use async_trait::async_trait;
use tracing::{info, warn};

use super::NotificationChannel;
use crate::Result;
use crate::notification::events::{NotificationEvent, NotificationPriority};

/// Writes every event at or above `min_priority` to the log.
/// High and critical events are logged as warnings.
pub struct LogChannel {
    enabled: bool,
    min_priority: NotificationPriority,
}

impl LogChannel {
    pub fn new(min_priority: NotificationPriority) -> Self {
        Self {
            enabled: true,
            min_priority,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min_priority: NotificationPriority::Critical,
        }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new(NotificationPriority::Normal)
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if !self.enabled || event.priority() < self.min_priority {
            return Ok(());
        }

        if event.priority() >= NotificationPriority::High {
            warn!(
                target: "streamwatch::alert",
                event_type = event.event_type(),
                priority = %event.priority(),
                "{}",
                event.message()
            );
        } else {
            info!(
                target: "streamwatch::alert",
                event_type = event.event_type(),
                priority = %event.priority(),
                "{}",
                event.message()
            );
        }
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        let event = NotificationEvent::SystemStartup {
            version: "test".to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.send(&event).await
    }
}
