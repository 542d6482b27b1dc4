//! Notification fan-out.
//!
//! [`NotificationService::dispatch`] is what callers on the hot path use: it
//! publishes the event to in-process subscribers and hands channel delivery
//! to a detached task, so a slow or failing channel never holds up a monitor
//! loop. There is no retry; failures are logged and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::channels::{LogChannel, NotificationChannel, WebhookChannel, WebhookConfig};
use super::events::NotificationEvent;
use crate::Result;
use crate::config::settings::NotifySettings;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of delivering one event to every enabled channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Statistics about the notification service.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationStats {
    pub channel_count: usize,
    /// Events handed to `notify` or `dispatch`.
    pub events: u64,
    /// Successful channel deliveries.
    pub delivered: u64,
    /// Failed channel deliveries.
    pub failed: u64,
}

pub struct NotificationService {
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
    event_tx: broadcast::Sender<NotificationEvent>,
    events: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl NotificationService {
    /// A service with no channels.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            channels: RwLock::new(Vec::new()),
            event_tx,
            events: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// The log channel, plus a webhook channel when one is configured.
    pub fn from_settings(settings: &NotifySettings) -> Self {
        let service = Self::new();
        service.add_channel(Arc::new(LogChannel::default()));
        if let Some(config) = WebhookConfig::from_settings(settings) {
            debug!(url = %config.url, "Webhook notifications enabled");
            service.add_channel(Arc::new(WebhookChannel::new(config)));
        }
        service
    }

    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        if !channel.is_enabled() {
            debug!("Skipping disabled {} channel", channel.channel_type());
            return;
        }
        self.channels.write().push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Receive every event passed through this service.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }

    /// Deliver `event` to all channels concurrently and wait for them.
    pub async fn notify(&self, event: NotificationEvent) -> DeliveryReport {
        self.events.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_tx.send(event.clone());
        self.deliver(&event).await
    }

    /// Fire-and-forget delivery on a detached task.
    pub fn dispatch(self: &Arc<Self>, event: NotificationEvent) -> JoinHandle<DeliveryReport> {
        self.events.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_tx.send(event.clone());

        let service = Arc::clone(self);
        tokio::spawn(async move { service.deliver(&event).await })
    }

    async fn deliver(&self, event: &NotificationEvent) -> DeliveryReport {
        let channels = self.channels.read().clone();
        if channels.is_empty() {
            return DeliveryReport::default();
        }

        let results = join_all(channels.iter().map(|channel| async move {
            let result = channel.send(event).await;
            (channel.channel_type(), result)
        }))
        .await;

        let mut report = DeliveryReport::default();
        for (channel_type, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        channel = channel_type,
                        event_type = event.event_type(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        }

        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        report
    }

    /// Run `test()` on every channel.
    pub async fn test_channels(&self) -> Vec<(&'static str, Result<()>)> {
        let channels = self.channels.read().clone();
        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            results.push((channel.channel_type(), channel.test().await));
        }
        results
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            channel_count: self.channel_count(),
            events: self.events.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}
