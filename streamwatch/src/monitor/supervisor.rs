//! Supervisor for per-stream monitor loops.
//!
//! The `MonitorSupervisor` is responsible for:
//! - Starting exactly one [`StreamMonitor`] per distinct assigned stream URL
//! - Reconciling the running set against assignments (periodically and on
//!   `AssignmentsUpdated` events)
//! - Restarting crashed loops with backoff from the [`RestartTracker`]
//! - Coordinating graceful shutdown

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::actor::{MonitorConfig, StreamMonitor, panic_message};
use super::logger::EventLogger;
use super::metrics::MetricsRegistry;
use super::restart_tracker::{
    RestartDecision, RestartTracker, RestartTrackerConfig, RestartTrackerStats,
};
use crate::Result;
use crate::config::settings::MonitorSettings;
use crate::config::{ConfigUpdateEvent, RuleStore};
use crate::database::repositories::AssignmentRepository;
use crate::detection::DetectorSet;
use crate::domain::StreamUrl;
use crate::notification::{NotificationEvent, NotificationService};

/// Everything a monitor loop needs, shared by all loops.
#[derive(Clone)]
pub struct MonitorContext {
    pub detectors: DetectorSet,
    pub rules: Arc<RuleStore>,
    pub logger: Arc<EventLogger>,
    pub notifier: Arc<NotificationService>,
    pub metrics: Arc<MetricsRegistry>,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub restart: RestartTrackerConfig,
    pub shutdown_timeout: Duration,
    /// Assignment rescan period. `None` only reconciles at startup and on events.
    pub rescan_interval: Option<Duration>,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            rescan_interval: settings.rescan_interval,
            ..Default::default()
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart: RestartTrackerConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
            rescan_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Read-only view of the running loops, shared with the health API.
#[derive(Debug, Clone, Default)]
pub struct RunningMonitors {
    inner: Arc<RwLock<BTreeMap<String, DateTime<Utc>>>>,
}

impl RunningMonitors {
    pub fn contains(&self, stream_url: &str) -> bool {
        self.inner.read().contains_key(stream_url)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Sorted stream URLs.
    pub fn urls(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// `(stream_url, started_at)` pairs sorted by URL.
    pub fn entries(&self) -> Vec<(String, DateTime<Utc>)> {
        self.inner
            .read()
            .iter()
            .map(|(url, at)| (url.clone(), *at))
            .collect()
    }

    pub(crate) fn insert(&self, stream_url: &str) {
        self.inner.write().insert(stream_url.to_string(), Utc::now());
    }

    fn remove(&self, stream_url: &str) {
        self.inner.write().remove(stream_url);
    }

    fn clear(&self) {
        self.inner.write().clear();
    }
}

/// Result of a monitor task, produced even when the loop panicked.
#[derive(Debug)]
pub struct MonitorTaskResult {
    pub stream_url: String,
    pub outcome: std::result::Result<(), String>,
}

impl MonitorTaskResult {
    pub fn is_crash(&self) -> bool {
        self.outcome.is_err()
    }
}

#[derive(Debug)]
struct PendingRestart {
    stream_url: String,
    restart_at: tokio::time::Instant,
}

/// What one reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

pub struct MonitorSupervisor {
    context: MonitorContext,
    assignments: Arc<dyn AssignmentRepository>,
    config: SupervisorConfig,
    cancellation_token: CancellationToken,
    tasks: JoinSet<MonitorTaskResult>,
    /// Child token per stream with a live task.
    tokens: HashMap<String, CancellationToken>,
    /// Streams cancelled on purpose whose task has not finished yet.
    stopping: HashSet<String>,
    /// Streams that hit the restart limit; skipped until unassigned.
    given_up: HashSet<String>,
    restart_tracker: RestartTracker,
    pending_restarts: Vec<PendingRestart>,
    running: RunningMonitors,
}

impl MonitorSupervisor {
    pub fn new(
        context: MonitorContext,
        assignments: Arc<dyn AssignmentRepository>,
        config: SupervisorConfig,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            context,
            assignments,
            restart_tracker: RestartTracker::with_config(config.restart.clone()),
            config,
            cancellation_token,
            tasks: JoinSet::new(),
            tokens: HashMap::new(),
            stopping: HashSet::new(),
            given_up: HashSet::new(),
            pending_restarts: Vec::new(),
            running: RunningMonitors::default(),
        }
    }

    /// Handle to the running set, valid after the supervisor moves into `run`.
    pub fn running(&self) -> RunningMonitors {
        self.running.clone()
    }

    pub fn is_running(&self, stream_url: &str) -> bool {
        self.tokens.contains_key(stream_url)
    }

    /// Number of live monitor tasks.
    pub fn monitor_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn pending_restart_count(&self) -> usize {
        self.pending_restarts.len()
    }

    /// Read assignments and converge the running set onto their distinct URLs.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport> {
        let urls = self.assignments.distinct_stream_urls().await?;
        Ok(self.reconcile_with(urls))
    }

    /// Converge onto `urls`; duplicates are collapsed.
    pub fn reconcile_with(&mut self, urls: impl IntoIterator<Item = String>) -> ReconcileReport {
        let desired: BTreeSet<String> = urls.into_iter().collect();
        let mut report = ReconcileReport::default();

        let mut forgotten: Vec<String> = self
            .given_up
            .iter()
            .chain(self.pending_restarts.iter().map(|r| &r.stream_url))
            .filter(|url| !desired.contains(*url))
            .cloned()
            .collect();
        forgotten.dedup();
        self.given_up.retain(|url| desired.contains(url));
        self.pending_restarts
            .retain(|r| desired.contains(&r.stream_url));
        for url in &forgotten {
            self.restart_tracker.remove(url);
            self.context.metrics.remove(url);
        }

        let obsolete: Vec<String> = self
            .tokens
            .keys()
            .filter(|url| !desired.contains(*url))
            .cloned()
            .collect();
        for url in obsolete {
            if self.stop(&url, "stream no longer assigned") {
                report.stopped.push(url);
            }
        }

        for url in desired {
            if self.tokens.contains_key(&url)
                || self.given_up.contains(&url)
                || self.pending_restarts.iter().any(|r| r.stream_url == url)
            {
                continue;
            }
            match self.spawn(&url) {
                Ok(()) => report.started.push(url),
                Err(e) => warn!(stream = %url, error = %e, "Failed to start monitor"),
            }
        }

        report.stopped.sort();
        if !report.is_empty() {
            info!(
                started = report.started.len(),
                stopped = report.stopped.len(),
                running = self.tokens.len(),
                "Reconciled monitors"
            );
        }
        report
    }

    /// Start the loop for `stream_url`.
    pub fn spawn(&mut self, stream_url: &str) -> std::result::Result<(), SpawnError> {
        if self.cancellation_token.is_cancelled() {
            return Err(SpawnError::ShuttingDown);
        }
        if self.tokens.contains_key(stream_url) {
            return Err(SpawnError::MonitorExists(stream_url.to_string()));
        }

        let token = self.cancellation_token.child_token();
        let monitor = StreamMonitor::new(
            StreamUrl::from_trusted(stream_url),
            self.context.detectors.clone(),
            self.context.rules.clone(),
            self.context.logger.clone(),
            self.context.metrics.get_or_create(stream_url),
            self.context.monitor.clone(),
            token.clone(),
        );

        let url = stream_url.to_string();
        self.tasks.spawn(async move {
            let outcome = match AssertUnwindSafe(monitor.run()).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
            };
            MonitorTaskResult {
                stream_url: url,
                outcome,
            }
        });

        self.tokens.insert(stream_url.to_string(), token);
        self.running.insert(stream_url);
        self.context
            .notifier
            .dispatch(NotificationEvent::MonitorStarted {
                stream_url: stream_url.to_string(),
                timestamp: Utc::now(),
            });
        info!(stream = stream_url, "Spawned monitor");
        Ok(())
    }

    /// Cancel the loop for `stream_url` and forget its history.
    pub fn stop(&mut self, stream_url: &str, reason: &str) -> bool {
        let Some(token) = self.tokens.remove(stream_url) else {
            return false;
        };
        token.cancel();
        self.stopping.insert(stream_url.to_string());
        self.running.remove(stream_url);
        self.restart_tracker.remove(stream_url);
        self.context.metrics.remove(stream_url);
        self.context
            .notifier
            .dispatch(NotificationEvent::MonitorStopped {
                stream_url: stream_url.to_string(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
        info!(stream = stream_url, reason, "Stopping monitor");
        true
    }

    /// Classify a finished task and schedule a restart when it crashed.
    pub fn handle_task_completion(&mut self, result: MonitorTaskResult) -> TaskCompletionAction {
        let stream_url = result.stream_url;

        if self.stopping.remove(&stream_url) {
            debug!(stream = %stream_url, "Monitor stopped after unassignment");
            return TaskCompletionAction::Stopped { stream_url };
        }

        self.tokens.remove(&stream_url);
        self.running.remove(&stream_url);

        if self.cancellation_token.is_cancelled() {
            return TaskCompletionAction::Cancelled { stream_url };
        }

        let error_msg = match result.outcome {
            Ok(()) => {
                debug!(stream = %stream_url, "Monitor exited");
                return TaskCompletionAction::Stopped { stream_url };
            }
            Err(e) => e,
        };

        error!(stream = %stream_url, error = %error_msg, "Monitor crashed");
        if let Some(metrics) = self.context.metrics.get(&stream_url) {
            metrics.record_restart();
        }

        match self.restart_tracker.record_failure(&stream_url) {
            RestartDecision::Restart(backoff) => {
                self.pending_restarts.push(PendingRestart {
                    stream_url: stream_url.clone(),
                    restart_at: tokio::time::Instant::now() + backoff,
                });
                self.context
                    .notifier
                    .dispatch(NotificationEvent::MonitorRestarted {
                        stream_url: stream_url.clone(),
                        error: error_msg,
                        backoff_secs: backoff.as_secs(),
                        timestamp: Utc::now(),
                    });
                TaskCompletionAction::RestartScheduled {
                    stream_url,
                    backoff,
                }
            }
            RestartDecision::GiveUp { failures } => {
                self.given_up.insert(stream_url.clone());
                self.context
                    .notifier
                    .dispatch(NotificationEvent::MonitorStopped {
                        stream_url: stream_url.clone(),
                        reason: format!(
                            "restart limit reached after {} failures: {}",
                            failures, error_msg
                        ),
                        timestamp: Utc::now(),
                    });
                TaskCompletionAction::RestartLimitExceeded { stream_url }
            }
        }
    }

    /// Start every restart whose backoff has elapsed. Returns how many started.
    pub fn process_pending_restarts(&mut self) -> usize {
        let now = tokio::time::Instant::now();
        let (due, not_due): (Vec<_>, Vec<_>) = self
            .pending_restarts
            .drain(..)
            .partition(|r| r.restart_at <= now);
        self.pending_restarts = not_due;

        let mut restarted = 0;
        for restart in due {
            info!(stream = %restart.stream_url, "Restarting monitor");
            match self.spawn(&restart.stream_url) {
                Ok(()) => restarted += 1,
                Err(e) => error!(stream = %restart.stream_url, error = %e, "Failed to restart monitor"),
            }
        }
        restarted
    }

    pub fn next_restart_time(&self) -> Option<tokio::time::Instant> {
        self.pending_restarts.iter().map(|r| r.restart_at).min()
    }

    /// Reconcile once, then supervise until the cancellation token fires.
    pub async fn run(
        mut self,
        mut config_events: broadcast::Receiver<ConfigUpdateEvent>,
    ) -> ShutdownReport {
        if let Err(e) = self.reconcile().await {
            error!(error = %e, "Initial assignment scan failed");
        }

        let mut rescan = self.config.rescan_interval.map(|period| {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });
        let mut events_open = true;

        loop {
            let next_restart = self.next_restart_time();

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    info!("Supervisor cancelled");
                    break;
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok(result) => {
                            let action = self.handle_task_completion(result);
                            debug!(?action, "Monitor task completed");
                        }
                        Err(e) => warn!("Monitor task join error: {}", e),
                    }
                }
                _ = tokio::time::sleep_until(next_restart.unwrap_or_else(tokio::time::Instant::now)),
                    if next_restart.is_some() => {
                    self.process_pending_restarts();
                }
                event = config_events.recv(), if events_open => match event {
                    Ok(ConfigUpdateEvent::AssignmentsUpdated) | Err(RecvError::Lagged(_)) => {
                        debug!("Assignments changed, reconciling");
                        if let Err(e) = self.reconcile().await {
                            warn!(error = %e, "Assignment reconcile failed");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => {
                        debug!("Config event channel closed");
                        events_open = false;
                    }
                },
                _ = tick(&mut rescan) => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "Periodic assignment rescan failed");
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Cancel every loop, wait up to the shutdown timeout, then abort.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let total_monitors = self.tasks.len();
        info!(
            total_monitors,
            timeout = ?self.config.shutdown_timeout,
            "Shutting down monitors"
        );

        self.cancellation_token.cancel();
        for token in self.tokens.values() {
            token.cancel();
        }

        let mut graceful_stops = 0;
        let mut forced_terminations = 0;
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        while !self.tasks.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    forced_terminations += self.tasks.len();
                    warn!(remaining = self.tasks.len(), "Shutdown timeout reached, aborting monitors");
                    self.tasks.abort_all();
                    while self.tasks.join_next().await.is_some() {}
                    break;
                }
                joined = self.tasks.join_next() => match joined {
                    Some(Ok(result)) if !result.is_crash() => graceful_stops += 1,
                    Some(Ok(result)) => {
                        debug!(stream = %result.stream_url, "Monitor failed during shutdown");
                        forced_terminations += 1;
                    }
                    Some(Err(e)) => {
                        warn!("Monitor task join error during shutdown: {}", e);
                        forced_terminations += 1;
                    }
                    None => break,
                }
            }
        }

        self.tokens.clear();
        self.stopping.clear();
        self.pending_restarts.clear();
        self.running.clear();

        let report = ShutdownReport {
            total_monitors,
            graceful_stops,
            forced_terminations,
        };
        info!(
            "Shutdown complete: {} total, {} graceful, {} forced",
            report.total_monitors, report.graceful_stops, report.forced_terminations
        );
        report
    }

    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            monitor_count: self.tokens.len(),
            pending_restarts: self.pending_restarts.len(),
            given_up: self.given_up.len(),
            restart_stats: self.restart_tracker.stats(),
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Action taken after a task completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCompletionAction {
    /// Loop ended because its stream was unassigned (or it exited cleanly).
    Stopped { stream_url: String },
    /// Loop ended because the supervisor is shutting down.
    Cancelled { stream_url: String },
    RestartScheduled { stream_url: String, backoff: Duration },
    RestartLimitExceeded { stream_url: String },
}

#[derive(Debug, Clone)]
pub enum SpawnError {
    MonitorExists(String),
    ShuttingDown,
}

impl std::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnError::MonitorExists(url) => write!(f, "Monitor already running: {}", url),
            SpawnError::ShuttingDown => write!(f, "Supervisor is shutting down"),
        }
    }
}

impl std::error::Error for SpawnError {}

#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub total_monitors: usize,
    pub graceful_stops: usize,
    pub forced_terminations: usize,
}

impl ShutdownReport {
    pub fn all_graceful(&self) -> bool {
        self.forced_terminations == 0
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorStats {
    pub monitor_count: usize,
    pub pending_restarts: usize,
    pub given_up: usize,
    pub restart_stats: RestartTrackerStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::EventCategory;
    use crate::detection::Detector;
    use crate::monitor::testing::{FixedDetector, MemoryEvents, StaticAssignments};

    struct Fixture {
        assignments: Arc<StaticAssignments>,
        events: Arc<MemoryEvents>,
        notifier: Arc<NotificationService>,
        metrics: Arc<MetricsRegistry>,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                assignments: Arc::new(StaticAssignments::default()),
                events: Arc::new(MemoryEvents::default()),
                notifier: Arc::new(NotificationService::new()),
                metrics: Arc::new(MetricsRegistry::new()),
                cancel: CancellationToken::new(),
            }
        }

        fn supervisor(&self, detectors: Vec<Arc<dyn Detector>>) -> MonitorSupervisor {
            let context = MonitorContext {
                detectors: DetectorSet::from_detectors(detectors),
                rules: Arc::new(RuleStore::new()),
                logger: Arc::new(EventLogger::new(self.events.clone(), self.notifier.clone())),
                notifier: self.notifier.clone(),
                metrics: self.metrics.clone(),
                monitor: MonitorConfig {
                    poll_interval: Duration::from_millis(10),
                    max_failed_cycles: 1,
                },
            };
            MonitorSupervisor::new(
                context,
                self.assignments.clone(),
                SupervisorConfig {
                    shutdown_timeout: Duration::from_secs(1),
                    rescan_interval: None,
                    ..Default::default()
                },
                self.cancel.clone(),
            )
        }
    }

    fn quiet() -> Vec<Arc<dyn Detector>> {
        vec![Arc::new(FixedDetector::new(EventCategory::Chat, None))]
    }

    #[tokio::test]
    async fn test_zero_assignments_zero_monitors() {
        let fx = Fixture::new();
        let mut supervisor = fx.supervisor(quiet());
        let report = supervisor.reconcile().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(supervisor.monitor_count(), 0);
        assert!(supervisor.running().is_empty());
    }

    #[tokio::test]
    async fn test_one_monitor_per_distinct_url() {
        let fx = Fixture::new();
        fx.assignments.set(&[
            "https://twitch.tv/a",
            "https://twitch.tv/a",
            "https://kick.com/b",
        ]);
        let mut supervisor = fx.supervisor(quiet());

        let report = supervisor.reconcile().await.unwrap();
        assert_eq!(report.started, vec!["https://kick.com/b", "https://twitch.tv/a"]);
        assert_eq!(supervisor.monitor_count(), 2);

        // A second pass over the same assignments starts nothing.
        assert!(supervisor.reconcile().await.unwrap().is_empty());
        assert!(matches!(
            supervisor.spawn("https://twitch.tv/a"),
            Err(SpawnError::MonitorExists(_))
        ));

        let shutdown = supervisor.shutdown().await;
        assert_eq!(shutdown.total_monitors, 2);
        assert!(shutdown.all_graceful());
    }

    #[tokio::test]
    async fn test_reconcile_stops_unassigned_streams() {
        let fx = Fixture::new();
        let mut supervisor = fx.supervisor(quiet());
        supervisor.reconcile_with(vec!["https://twitch.tv/a".to_string(), "https://twitch.tv/b".to_string()]);

        let report = supervisor.reconcile_with(vec!["https://twitch.tv/b".to_string()]);
        assert_eq!(report.stopped, vec!["https://twitch.tv/a"]);
        assert!(!supervisor.running().contains("https://twitch.tv/a"));
        assert!(fx.metrics.get("https://twitch.tv/a").is_none());

        let result = supervisor.tasks.join_next().await.unwrap().unwrap();
        assert_eq!(result.stream_url, "https://twitch.tv/a");
        assert_eq!(
            supervisor.handle_task_completion(result),
            TaskCompletionAction::Stopped {
                stream_url: "https://twitch.tv/a".to_string()
            }
        );
        assert_eq!(supervisor.monitor_count(), 1);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_crash_schedules_restart() {
        let fx = Fixture::new();
        let mut supervisor = fx.supervisor(quiet());
        supervisor.reconcile_with(vec!["https://twitch.tv/a".to_string()]);

        let action = supervisor.handle_task_completion(MonitorTaskResult {
            stream_url: "https://twitch.tv/a".to_string(),
            outcome: Err("boom".to_string()),
        });
        assert_eq!(
            action,
            TaskCompletionAction::RestartScheduled {
                stream_url: "https://twitch.tv/a".to_string(),
                backoff: Duration::ZERO
            }
        );
        assert!(!supervisor.running().contains("https://twitch.tv/a"));
        assert_eq!(supervisor.pending_restart_count(), 1);

        // A reconcile while the restart is pending must not double-start.
        assert!(supervisor.reconcile_with(vec!["https://twitch.tv/a".to_string()]).is_empty());

        assert_eq!(supervisor.process_pending_restarts(), 1);
        assert!(supervisor.running().contains("https://twitch.tv/a"));
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_limit_gives_up_until_unassigned() {
        let fx = Fixture::new();
        let mut supervisor = fx.supervisor(quiet());
        supervisor.restart_tracker = RestartTracker::with_config(RestartTrackerConfig {
            max_failures: 1,
            ..Default::default()
        });
        let url = "https://twitch.tv/a".to_string();

        let action = supervisor.handle_task_completion(MonitorTaskResult {
            stream_url: url.clone(),
            outcome: Err("boom".to_string()),
        });
        assert_eq!(
            action,
            TaskCompletionAction::RestartLimitExceeded {
                stream_url: url.clone()
            }
        );
        assert!(supervisor.reconcile_with(vec![url.clone()]).is_empty());

        supervisor.reconcile_with(Vec::<String>::new());
        assert_eq!(supervisor.reconcile_with(vec![url.clone()]).started, vec![url]);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_reacts_to_assignment_events() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor(quiet());
        let running = supervisor.running();
        let (tx, rx) = broadcast::channel(8);
        let handle = tokio::spawn(supervisor.run(rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(running.is_empty());

        fx.assignments.set(&["https://twitch.tv/a"]);
        tx.send(ConfigUpdateEvent::AssignmentsUpdated).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(running.urls(), vec!["https://twitch.tv/a"]);

        fx.cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.total_monitors, 1);
        assert!(running.is_empty());
    }

    #[tokio::test]
    async fn test_crashed_loop_is_restarted_by_run() {
        let fx = Fixture::new();
        fx.assignments.set(&["https://twitch.tv/a"]);
        // One all-failed cycle ends the loop with an error.
        let supervisor = fx.supervisor(vec![Arc::new(
            crate::monitor::testing::FailingDetector(EventCategory::Visual),
        )]);
        let (_tx, rx) = broadcast::channel(8);
        let handle = tokio::spawn(supervisor.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let metrics = fx.metrics.get("https://twitch.tv/a").unwrap();
        assert!(metrics.snapshot().restarts >= 1);

        fx.cancel.cancel();
        handle.await.unwrap();
    }
}
