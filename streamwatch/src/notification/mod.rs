//! Notification system module.
//!
//! Delivers violation alerts and monitor lifecycle events through the
//! configured channels (log, webhook). Delivery is fire-and-forget from the
//! caller's point of view; failures are logged and counted, never retried.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamwatch::notification::{NotificationEvent, NotificationService};
//! use streamwatch::notification::channels::LogChannel;
//!
//! let service = Arc::new(NotificationService::new());
//! service.add_channel(Arc::new(LogChannel::default()));
//! service.dispatch(NotificationEvent::violation(url, category, finding, None));
//! ```

pub mod channels;
pub mod events;
pub mod service;

pub use channels::{LogChannel, NotificationChannel, WebhookChannel, WebhookConfig};
pub use events::{NotificationEvent, NotificationPriority};
pub use service::{DeliveryReport, NotificationService, NotificationStats};
