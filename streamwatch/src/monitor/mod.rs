//! Stream monitoring: per-stream detection loops and their supervisor.
//!
//! - [`StreamMonitor`] polls one stream: visual, audio, then chat, then a fixed sleep
//! - [`EventLogger`] persists each finding and hands it to the notification service
//! - [`MonitorSupervisor`] keeps one loop per distinct assigned stream URL running
//! - [`RestartTracker`] decides backoff for crashed loops
//! - [`MetricsRegistry`] exposes per-stream counters to the health API

mod actor;
mod logger;
mod metrics;
mod restart_tracker;
mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use actor::{CycleReport, MonitorConfig, MonitorError, StreamMonitor};
pub use logger::{EventLogger, LogOutcome};
pub use metrics::{MetricsRegistry, MonitorMetrics, MonitorMetricsSnapshot};
pub use restart_tracker::{
    RestartDecision, RestartTracker, RestartTrackerConfig, RestartTrackerStats,
};
pub use supervisor::{
    MonitorContext, MonitorSupervisor, MonitorTaskResult, ReconcileReport, RunningMonitors,
    ShutdownReport, SpawnError, SupervisorConfig, SupervisorStats, TaskCompletionAction,
};
