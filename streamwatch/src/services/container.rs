//! Service container for dependency injection.
//!
//! The ServiceContainer builds every application service from one
//! [`AppConfig`] and database pool, and starts the background tasks:
//! rule refresher, monitor supervisor, log retention and the health API.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Result;
use crate::admin::{AdminRepositories, AdminService};
use crate::api::{ApiServer, AppState};
use crate::config::settings::DEFAULT_ADMIN_USERNAME;
use crate::config::{AppConfig, ConfigEventBroadcaster, RuleRefresher, RuleStore};
use crate::database::{self, DbPool};
use crate::detection::DetectorSet;
use crate::detection::simulated::simulated_detectors;
use crate::metrics::HealthChecker;
use crate::monitor::{
    EventLogger, MetricsRegistry, MonitorConfig, MonitorContext, MonitorSupervisor,
    RunningMonitors, ShutdownReport, SupervisorConfig,
};
use crate::notification::{NotificationEvent, NotificationService};

/// Grace period for the API server and refresher after cancellation.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: DbPool,
    pub config: AppConfig,
    pub repos: AdminRepositories,
    pub admin: Arc<AdminService>,
    /// Config change events (shared between services).
    pub config_events: ConfigEventBroadcaster,
    pub rules: Arc<RuleStore>,
    pub notifier: Arc<NotificationService>,
    pub metrics: Arc<MetricsRegistry>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

/// Background tasks started by [`ServiceContainer::start`].
pub struct ServiceHandles {
    supervisor: JoinHandle<ShutdownReport>,
    refresher: JoinHandle<()>,
    api: Option<JoinHandle<Result<()>>>,
    /// Streams with a running loop; stays valid after the supervisor moves.
    pub running: RunningMonitors,
}

/// Point-in-time service statistics.
#[derive(Debug, Clone)]
pub struct ServiceStats {
    pub running_monitors: usize,
    pub rules_version: u64,
    pub notification_channels: usize,
    pub config_subscribers: usize,
}

impl ServiceContainer {
    /// Open the configured database, apply migrations and build the services.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;
        Ok(Self::with_pool(pool, config))
    }

    /// Build the services on an already migrated pool.
    pub fn with_pool(pool: DbPool, config: AppConfig) -> Self {
        info!("Initializing service container");

        let repos = AdminRepositories::sqlx(&pool);
        let config_events = ConfigEventBroadcaster::new();
        let admin = Arc::new(AdminService::new(repos.clone(), config_events.clone()));
        let notifier = Arc::new(NotificationService::from_settings(&config.notify));

        Self {
            pool,
            config,
            repos,
            admin,
            config_events,
            rules: Arc::new(RuleStore::new()),
            notifier,
            metrics: Arc::new(MetricsRegistry::new()),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Seed the admin account and load the first rule snapshot.
    pub async fn initialize(&self) -> Result<()> {
        if self
            .admin
            .seed_admin(DEFAULT_ADMIN_USERNAME, &self.config.admin_password)
            .await?
        {
            if self.config.admin_password_is_default {
                warn!(
                    username = DEFAULT_ADMIN_USERNAME,
                    "Seeded admin account with the default password; set STREAMWATCH_ADMIN_PASSWORD"
                );
            } else {
                info!(username = DEFAULT_ADMIN_USERNAME, "Seeded admin account");
            }
        }

        self.rule_refresher().refresh().await?;
        Ok(())
    }

    fn rule_refresher(&self) -> RuleRefresher {
        RuleRefresher::new(
            self.rules.clone(),
            self.repos.rules.clone(),
            self.config_events.clone(),
            self.config.monitor.rules_refresh_interval,
        )
    }

    /// Everything a monitor loop shares with its siblings.
    pub fn monitor_context(&self, detectors: DetectorSet) -> MonitorContext {
        MonitorContext {
            detectors,
            rules: self.rules.clone(),
            logger: Arc::new(EventLogger::new(
                self.repos.events.clone(),
                self.notifier.clone(),
            )),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
            monitor: MonitorConfig::from_settings(&self.config.monitor),
        }
    }

    /// Supervisor over the given detectors; not started.
    pub fn supervisor(&self, detectors: DetectorSet) -> MonitorSupervisor {
        MonitorSupervisor::new(
            self.monitor_context(detectors),
            self.repos.assignments.clone(),
            SupervisorConfig::from_settings(&self.config.monitor),
            self.cancellation_token.child_token(),
        )
    }

    /// Start monitoring with the simulated detector backends and serve the health API.
    ///
    /// Fails, with everything already started shut down again, when the API
    /// address cannot be bound.
    pub async fn start(&self) -> Result<ServiceHandles> {
        let detectors = simulated_detectors(&self.config.detectors);
        let mut handles = self.start_monitoring(detectors);

        let health = HealthChecker::new(self.pool.clone(), self.metrics.clone(), handles.running.clone())
            .with_notifier(self.notifier.clone());
        let state = AppState::new(self.metrics.clone(), handles.running.clone())
            .with_health_checker(Arc::new(health));
        let server = ApiServer::new(
            self.config.api.clone(),
            state,
            self.cancellation_token.child_token(),
        );

        let listener = match server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "API server failed to start");
                self.shutdown(handles, "API server failed to start").await?;
                return Err(e);
            }
        };
        handles.api = Some(tokio::spawn(async move {
            let result = server.serve(listener).await;
            if let Err(e) = &result {
                error!(error = %e, "API server stopped unexpectedly");
            }
            result
        }));

        self.notifier.dispatch(NotificationEvent::SystemStartup {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
        });
        Ok(handles)
    }

    /// Start the rule refresher and the monitor supervisor only.
    pub fn start_monitoring(&self, detectors: DetectorSet) -> ServiceHandles {
        let refresher = self
            .rule_refresher()
            .start(self.cancellation_token.child_token());

        let supervisor = self.supervisor(detectors);
        let running = supervisor.running();
        let events = self.config_events.subscribe();
        let supervisor = tokio::spawn(supervisor.run(events));

        info!("Monitoring started");
        ServiceHandles {
            supervisor,
            refresher,
            api: None,
            running,
        }
    }

    /// Cancel every task and wait for them.
    pub async fn shutdown(&self, handles: ServiceHandles, reason: &str) -> Result<ShutdownReport> {
        info!(reason, "Shutting down services");
        self.cancellation_token.cancel();

        // Monitors stop within their own timeout; the rest get a grace period.
        let report = match handles.supervisor.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Supervisor task failed");
                ShutdownReport::default()
            }
        };

        let rest = async {
            if let Err(e) = handles.refresher.await {
                warn!(error = %e, "Rule refresher task failed");
            }
            if let Some(api) = handles.api {
                // Serve errors are logged by the task itself.
                if let Err(e) = api.await {
                    warn!(error = %e, "API server task failed");
                }
            }
        };
        if tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, rest).await.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        self.notifier
            .notify(NotificationEvent::SystemShutdown {
                reason: reason.to_string(),
                timestamp: chrono::Utc::now(),
            })
            .await;

        self.pool.close().await;
        info!(
            monitors = report.total_monitors,
            forced = report.forced_terminations,
            "Services stopped"
        );
        Ok(report)
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn stats(&self, handles: &ServiceHandles) -> ServiceStats {
        ServiceStats {
            running_monitors: handles.running.len(),
            rules_version: self.rules.version(),
            notification_channels: self.notifier.channel_count(),
            config_subscribers: self.config_events.subscriber_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiServerConfig;
    use crate::database::models::UserRole;

    async fn container() -> ServiceContainer {
        let pool = database::init_pool_with_size("sqlite::memory:", 1)
            .await
            .unwrap();
        database::run_migrations(&pool).await.unwrap();
        ServiceContainer::with_pool(pool, AppConfig::default())
    }

    #[tokio::test]
    async fn test_initialize_seeds_admin_once() {
        let services = container().await;
        services.initialize().await.unwrap();
        services.initialize().await.unwrap();

        let admins = services.repos.users.list_by_role(UserRole::Admin).await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].username, DEFAULT_ADMIN_USERNAME);
        assert!(services.admin.authenticate("admin", "admin").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_start_and_shutdown_without_assignments() {
        let services = container().await;
        services.initialize().await.unwrap();

        let handles = services.start_monitoring(DetectorSet::from_detectors(Vec::new()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = services.stats(&handles);
        assert_eq!(stats.running_monitors, 0);
        assert_eq!(stats.notification_channels, 1);

        let report = services.shutdown(handles, "test").await.unwrap();
        assert_eq!(report.total_monitors, 0);
        assert!(services.is_shutting_down());
    }

    fn local_api(port: u16) -> AppConfig {
        AppConfig {
            api: ApiServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port,
                enable_cors: false,
            },
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_serves_api_until_shutdown() {
        let pool = database::init_pool_with_size("sqlite::memory:", 1)
            .await
            .unwrap();
        database::run_migrations(&pool).await.unwrap();
        let services = ServiceContainer::with_pool(pool, local_api(0));
        services.initialize().await.unwrap();

        let handles = services.start().await.unwrap();
        assert!(handles.api.is_some());
        assert!(!services.is_shutting_down());

        services.shutdown(handles, "test").await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_when_api_port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let pool = database::init_pool_with_size("sqlite::memory:", 1)
            .await
            .unwrap();
        database::run_migrations(&pool).await.unwrap();
        let services = ServiceContainer::with_pool(pool, local_api(port));
        services.initialize().await.unwrap();

        let err = services.start().await.err().unwrap();
        assert!(err.to_string().contains("Failed to bind"));
        // Monitoring started before the bind is torn down again.
        assert!(services.is_shutting_down());
    }
}
