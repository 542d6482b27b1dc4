//! Health check implementation.
//!
//! Overall status is `unhealthy` when the database cannot be reached and
//! `degraded` when any monitored stream's last cycle had detector failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::{self, DbPool};
use crate::monitor::{MetricsRegistry, RunningMonitors};
use crate::notification::NotificationService;

/// Health status of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// Functional, but something needs a look.
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health information for a single component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_duration_ms: Option<u64>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            check_duration_ms: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            check_duration_ms: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            check_duration_ms: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.check_duration_ms = Some(duration.as_millis() as u64);
        self
    }
}

/// Overall system health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub version: String,
    pub uptime_secs: u64,
    /// RFC 3339 time of the check.
    pub timestamp: String,
}

impl SystemHealth {
    /// Ready to serve: healthy or degraded.
    pub fn is_ready(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    fn from_components(components: Vec<ComponentHealth>, uptime: Duration) -> Self {
        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or_default();
        Self {
            status,
            components,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime.as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Checks the database, the monitor loops and the notification channels.
pub struct HealthChecker {
    pool: Option<DbPool>,
    metrics: Arc<MetricsRegistry>,
    running: RunningMonitors,
    notifier: Option<Arc<NotificationService>>,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(pool: DbPool, metrics: Arc<MetricsRegistry>, running: RunningMonitors) -> Self {
        Self {
            pool: Some(pool),
            metrics,
            running,
            notifier: None,
            start_time: Instant::now(),
        }
    }

    /// A checker without a database component.
    pub fn without_database(metrics: Arc<MetricsRegistry>, running: RunningMonitors) -> Self {
        Self {
            pool: None,
            metrics,
            running,
            notifier: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<NotificationService>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub async fn check_all(&self) -> SystemHealth {
        let mut components = Vec::with_capacity(3);
        if let Some(pool) = &self.pool {
            components.push(self.check_database(pool).await);
        }
        components.push(self.check_monitors());
        if let Some(notifier) = &self.notifier {
            components.push(Self::check_notifications(notifier));
        }
        SystemHealth::from_components(components, self.uptime())
    }

    /// Readiness check.
    pub async fn check_ready(&self) -> bool {
        self.check_all().await.is_ready()
    }

    async fn check_database(&self, pool: &DbPool) -> ComponentHealth {
        let start = Instant::now();
        match database::ping(pool).await {
            Ok(()) => ComponentHealth::healthy("database").with_duration(start.elapsed()),
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ComponentHealth::unhealthy("database", e.to_string()).with_duration(start.elapsed())
            }
        }
    }

    fn check_monitors(&self) -> ComponentHealth {
        let running = self.running.len();
        let degraded = self
            .metrics
            .degraded_streams()
            .into_iter()
            .filter(|url| self.running.contains(url))
            .collect::<Vec<_>>();

        if degraded.is_empty() {
            ComponentHealth::healthy("monitors")
                .with_message(format!("{} stream(s) monitored", running))
        } else {
            ComponentHealth::degraded(
                "monitors",
                format!(
                    "{} of {} stream(s) had detector failures: {}",
                    degraded.len(),
                    running,
                    degraded.join(", ")
                ),
            )
        }
    }

    fn check_notifications(notifier: &NotificationService) -> ComponentHealth {
        let stats = notifier.stats();
        let component = ComponentHealth::healthy("notifications").with_message(format!(
            "{} channel(s), {} delivered, {} failed",
            stats.channel_count, stats.delivered, stats.failed
        ));
        if stats.failed > 0 && stats.delivered == 0 {
            ComponentHealth {
                status: HealthStatus::Degraded,
                ..component
            }
        } else {
            component
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_is_worst_component() {
        let health = SystemHealth::from_components(
            vec![
                ComponentHealth::healthy("a"),
                ComponentHealth::degraded("b", "slow"),
            ],
            Duration::from_secs(5),
        );
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.is_ready());
        assert!(!health.is_healthy());

        let health = SystemHealth::from_components(
            vec![
                ComponentHealth::unhealthy("db", "down"),
                ComponentHealth::degraded("b", "slow"),
            ],
            Duration::ZERO,
        );
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(!health.is_ready());
    }

    #[tokio::test]
    async fn test_no_monitors_is_healthy() {
        let checker =
            HealthChecker::without_database(Arc::new(MetricsRegistry::new()), RunningMonitors::default());
        let health = checker.check_all().await;
        assert!(health.is_healthy());
        assert_eq!(health.components.len(), 1);
        assert_eq!(health.components[0].name, "monitors");
    }

    #[tokio::test]
    async fn test_database_component() {
        let pool = database::init_pool_with_size("sqlite::memory:", 1)
            .await
            .unwrap();
        let checker =
            HealthChecker::new(pool.clone(), Arc::new(MetricsRegistry::new()), RunningMonitors::default());
        assert!(checker.check_ready().await);

        pool.close().await;
        let health = checker.check_all().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.components[0].name, "database");
    }
}
