//! Notification channels.
//!
//! - Log: writes alert lines through `tracing`
//! - Generic webhooks (HTTP POST)

mod log;
mod webhook;

pub use log::LogChannel;
pub use webhook::{WebhookChannel, WebhookConfig};

use async_trait::async_trait;

use super::events::NotificationEvent;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Send a notification through this channel.
    async fn send(&self, event: &NotificationEvent) -> Result<()>;

    /// Test the channel configuration.
    async fn test(&self) -> Result<()>;
}
