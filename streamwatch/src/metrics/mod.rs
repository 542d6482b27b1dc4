//! Process health reporting.
//!
//! Per-stream counters live with the monitor loops
//! ([`crate::monitor::MetricsRegistry`]); this module folds them, the
//! database and the notification channels into one health verdict for the
//! `/health` endpoints.

mod health;

pub use health::{ComponentHealth, HealthChecker, HealthStatus, SystemHealth};
