//! Event logger: persist a finding, then notify.

use std::sync::Arc;

use tracing::{error, info};

use crate::database::models::{EventCategory, EventDbModel};
use crate::database::repositories::EventRepository;
use crate::detection::Finding;
use crate::domain::StreamUrl;
use crate::notification::{NotificationEvent, NotificationService};

/// What happened to one logged finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOutcome {
    /// Id of the inserted event row; `None` when the insert failed.
    pub event_id: Option<String>,
}

impl LogOutcome {
    pub fn persisted(&self) -> bool {
        self.event_id.is_some()
    }
}

/// Writes one event row per finding and hands a notification to the
/// [`NotificationService`]. The write is awaited; delivery is not.
pub struct EventLogger {
    events: Arc<dyn EventRepository>,
    notifier: Arc<NotificationService>,
}

impl EventLogger {
    pub fn new(events: Arc<dyn EventRepository>, notifier: Arc<NotificationService>) -> Self {
        Self { events, notifier }
    }

    /// Persist then notify. Neither failure is returned to the caller: a
    /// failed insert is logged and the notification is still sent.
    pub async fn log(
        &self,
        stream: &StreamUrl,
        category: EventCategory,
        finding: &Finding,
    ) -> LogOutcome {
        let event = EventDbModel::new(stream.as_str(), category, finding.as_str());

        let event_id = match self.events.insert(&event).await {
            Ok(()) => {
                info!(
                    stream = %stream,
                    category = %category,
                    event_id = %event.id,
                    "{}",
                    finding
                );
                Some(event.id)
            }
            Err(e) => {
                error!(
                    stream = %stream,
                    category = %category,
                    error = %e,
                    "Failed to persist event: {}",
                    finding
                );
                None
            }
        };

        self.notifier.dispatch(NotificationEvent::violation(
            stream.as_str(),
            category,
            finding.as_str(),
            event_id.clone(),
        ));

        LogOutcome { event_id }
    }
}
