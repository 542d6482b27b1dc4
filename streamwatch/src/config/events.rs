//! Configuration update events.
//!
//! Admin mutations publish these so the rule store and the monitor
//! supervisor can react before their next periodic refresh.

use tokio::sync::broadcast;

/// Events broadcast when admin-managed data changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigUpdateEvent {
    /// Chat/audio keyword list changed.
    KeywordsUpdated,
    /// Flagged object list changed.
    ObjectsUpdated,
    /// Assignments (or the streams they reference) changed.
    AssignmentsUpdated,
}

impl ConfigUpdateEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> &'static str {
        match self {
            Self::KeywordsUpdated => "Keyword rules updated",
            Self::ObjectsUpdated => "Flagged object rules updated",
            Self::AssignmentsUpdated => "Assignments updated",
        }
    }

    /// Whether the event affects the detector rule snapshot.
    pub fn affects_rules(&self) -> bool {
        matches!(self, Self::KeywordsUpdated | Self::ObjectsUpdated)
    }
}

/// Default channel capacity for config update events.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for configuration update events.
#[derive(Clone)]
pub struct ConfigEventBroadcaster {
    sender: broadcast::Sender<ConfigUpdateEvent>,
}

impl ConfigEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigUpdateEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers, 0 when nobody listens.
    pub fn publish(&self, event: ConfigUpdateEvent) -> usize {
        tracing::debug!("Publishing config event: {}", event.description());
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ConfigEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
