//! Generic webhook notification channel.

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::config::settings::NotifySettings;
use crate::notification::events::{NotificationEvent, NotificationPriority};
use crate::{Error, Result};

/// Webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
    /// Minimum priority level to send (default: Normal).
    #[serde(default)]
    pub min_priority: NotificationPriority,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            bearer_token: None,
            min_priority: NotificationPriority::Normal,
            timeout_secs: default_timeout(),
        }
    }
}

impl WebhookConfig {
    /// Config from process settings; `None` when no URL is configured.
    pub fn from_settings(settings: &NotifySettings) -> Option<Self> {
        let url = settings.webhook_url.clone()?;
        Some(Self {
            enabled: true,
            url,
            bearer_token: settings.webhook_token.clone(),
            timeout_secs: settings.webhook_timeout.as_secs().max(1),
            ..Default::default()
        })
    }
}

/// Generic webhook notification channel.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.config.bearer_token
            && let Ok(value) = format!("Bearer {}", token).parse()
        {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        headers
    }

    fn build_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        json!({
            "event_type": event.event_type(),
            "priority": event.priority().to_string(),
            "title": event.title(),
            "message": event.message(),
            "description": event.description(),
            "stream_url": event.stream_url(),
            "timestamp": event.timestamp().to_rfc3339(),
            "data": event
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        if event.priority() < self.config.min_priority {
            debug!(
                "Skipping webhook notification for {} (priority {} < {})",
                event.event_type(),
                event.priority(),
                self.config.min_priority
            );
            return Ok(());
        }

        let response = self
            .client
            .post(&self.config.url)
            .headers(self.build_headers())
            .json(&self.build_payload(event))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook failed: {} - {}", status, body);
            return Err(Error::Notification(format!(
                "Webhook failed: {} - {}",
                status, body
            )));
        }

        debug!("Webhook notification sent: {}", event.event_type());
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        let test_event = NotificationEvent::SystemStartup {
            version: "test".to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.send(&test_event).await
    }
}
