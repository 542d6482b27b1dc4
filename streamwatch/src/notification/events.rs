//! Notification events.
//!
//! Defines the events that can trigger notifications and their priority levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::EventCategory;

/// Priority level for notifications.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// Informational only.
    Low,
    #[default]
    Normal,
    High,
    /// Requires immediate attention.
    Critical,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationEvent {
    /// A detector matched something on a stream.
    ViolationDetected {
        stream_url: String,
        category: EventCategory,
        /// Detector finding, verbatim.
        finding: String,
        /// Id of the persisted event row, if the write succeeded.
        event_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A monitor loop started polling a stream.
    MonitorStarted {
        stream_url: String,
        timestamp: DateTime<Utc>,
    },
    /// A monitor loop stopped and will not be restarted.
    MonitorStopped {
        stream_url: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A monitor loop failed and a restart was scheduled.
    MonitorRestarted {
        stream_url: String,
        error: String,
        backoff_secs: u64,
        timestamp: DateTime<Utc>,
    },
    SystemStartup {
        version: String,
        timestamp: DateTime<Utc>,
    },
    SystemShutdown {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn violation(
        stream_url: impl Into<String>,
        category: EventCategory,
        finding: impl Into<String>,
        event_id: Option<String>,
    ) -> Self {
        Self::ViolationDetected {
            stream_url: stream_url.into(),
            category,
            finding: finding.into(),
            event_id,
            timestamp: Utc::now(),
        }
    }

    /// Get the priority of this event.
    pub fn priority(&self) -> NotificationPriority {
        match self {
            Self::ViolationDetected { .. } => NotificationPriority::High,
            Self::MonitorStarted { .. } => NotificationPriority::Low,
            Self::MonitorStopped { .. } => NotificationPriority::Normal,
            Self::MonitorRestarted { .. } => NotificationPriority::High,
            Self::SystemStartup { .. } => NotificationPriority::Normal,
            Self::SystemShutdown { .. } => NotificationPriority::Normal,
        }
    }

    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ViolationDetected { .. } => "violation_detected",
            Self::MonitorStarted { .. } => "monitor_started",
            Self::MonitorStopped { .. } => "monitor_stopped",
            Self::MonitorRestarted { .. } => "monitor_restarted",
            Self::SystemStartup { .. } => "system_startup",
            Self::SystemShutdown { .. } => "system_shutdown",
        }
    }

    /// The stream the event concerns, if any.
    pub fn stream_url(&self) -> Option<&str> {
        match self {
            Self::ViolationDetected { stream_url, .. }
            | Self::MonitorStarted { stream_url, .. }
            | Self::MonitorStopped { stream_url, .. }
            | Self::MonitorRestarted { stream_url, .. } => Some(stream_url),
            Self::SystemStartup { .. } | Self::SystemShutdown { .. } => None,
        }
    }

    /// Get a human-readable title for this event.
    pub fn title(&self) -> String {
        match self {
            Self::ViolationDetected { category, .. } => {
                format!("🚨 {} violation detected", category)
            }
            Self::MonitorStarted { stream_url, .. } => {
                format!("▶️ Monitoring {}", stream_url)
            }
            Self::MonitorStopped { stream_url, .. } => {
                format!("⏹️ Stopped monitoring {}", stream_url)
            }
            Self::MonitorRestarted { stream_url, .. } => {
                format!("🔄 Restarting monitor for {}", stream_url)
            }
            Self::SystemStartup { version, .. } => {
                format!("🚀 System started (v{})", version)
            }
            Self::SystemShutdown { reason, .. } => {
                format!("🛑 System shutting down: {}", reason)
            }
        }
    }

    /// Get a detailed description of this event.
    pub fn description(&self) -> String {
        match self {
            Self::ViolationDetected { finding, .. } => finding.clone(),
            Self::MonitorStarted { .. } => "Monitor loop started".to_string(),
            Self::MonitorStopped { reason, .. } => reason.clone(),
            Self::MonitorRestarted {
                error,
                backoff_secs,
                ..
            } => format!("{} (retrying in {}s)", error, backoff_secs),
            Self::SystemStartup { .. } => "Stream monitor is running".to_string(),
            Self::SystemShutdown { reason, .. } => reason.clone(),
        }
    }

    /// One-line alert text. For violations: `"{category} alert on {stream_url}: {finding}"`.
    pub fn message(&self) -> String {
        match self {
            Self::ViolationDetected {
                stream_url,
                category,
                finding,
                ..
            } => format!("{} alert on {}: {}", category, stream_url, finding),
            other => format!("{}: {}", other.title(), other.description()),
        }
    }

    /// Get the timestamp of this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ViolationDetected { timestamp, .. }
            | Self::MonitorStarted { timestamp, .. }
            | Self::MonitorStopped { timestamp, .. }
            | Self::MonitorRestarted { timestamp, .. }
            | Self::SystemStartup { timestamp, .. }
            | Self::SystemShutdown { timestamp, .. } => *timestamp,
        }
    }
}
