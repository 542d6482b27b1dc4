//! Integration tests for the monitoring pipeline.
//!
//! These tests use a real SQLite database file with migrations applied and
//! in-test detectors, so detector output, event rows and notifications can
//! be checked end to end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use streamwatch::config::{AppConfig, RuleSnapshot};
use streamwatch::database::models::{EventCategory, StreamDbModel, UserDbModel};
use streamwatch::database::{self, DbPool};
use streamwatch::detection::{
    ChatDetector, ChatMessage, ChatSource, Detector, DetectorError, DetectorSet, Finding,
};
use streamwatch::domain::StreamUrl;
use streamwatch::monitor::{MonitorConfig, StreamMonitor};
use streamwatch::notification::{NotificationChannel, NotificationEvent};
use streamwatch::services::ServiceContainer;
use streamwatch::{Error, Result};

/// Helper holding the temp directory alive alongside the container.
struct TestEnv {
    _dir: TempDir,
    services: ServiceContainer,
    notifications: Arc<RecordingChannel>,
}

async fn setup() -> TestEnv {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("test.db").display());
    let pool: DbPool = database::init_pool_with_size(&url, 2)
        .await
        .expect("Failed to create test pool");
    database::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let services = ServiceContainer::with_pool(pool, AppConfig::default());
    let notifications = Arc::new(RecordingChannel::default());
    services.notifier.add_channel(notifications.clone());
    services.initialize().await.expect("Failed to initialize");

    TestEnv {
        _dir: dir,
        services,
        notifications,
    }
}

/// Captures every notification it is asked to deliver.
#[derive(Default)]
struct RecordingChannel {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingChannel {
    fn violations(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, NotificationEvent::ViolationDetected { .. }))
            .cloned()
            .collect()
    }

    /// Wait for detached deliveries to land.
    async fn wait_for_violations(&self, expected: usize) -> Vec<NotificationEvent> {
        for _ in 0..100 {
            if self.violations().len() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Give a stray extra delivery the chance to show up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.violations()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        Ok(())
    }
}

struct StubDetector {
    category: EventCategory,
    finding: Option<&'static str>,
}

#[async_trait]
impl Detector for StubDetector {
    fn category(&self) -> EventCategory {
        self.category
    }

    async fn detect(
        &self,
        _stream: &StreamUrl,
        _rules: &RuleSnapshot,
    ) -> std::result::Result<Option<Finding>, DetectorError> {
        Ok(self.finding.map(Finding::new))
    }
}

struct CannedChat(Vec<&'static str>);

#[async_trait]
impl ChatSource for CannedChat {
    async fn recent_messages(
        &self,
        _stream: &StreamUrl,
        limit: usize,
    ) -> std::result::Result<Vec<ChatMessage>, DetectorError> {
        Ok(self.0.iter().take(limit).map(|m| ChatMessage::new(*m)).collect())
    }
}

fn monitor(env: &TestEnv, url: &str, detectors: DetectorSet) -> StreamMonitor {
    let context = env.services.monitor_context(detectors.clone());
    StreamMonitor::new(
        StreamUrl::new(url).unwrap(),
        detectors,
        context.rules,
        context.logger,
        context.metrics.get_or_create(url),
        MonitorConfig::default(),
        CancellationToken::new(),
    )
}

async fn agent_and_stream(env: &TestEnv, username: &str, url: &str) -> (UserDbModel, StreamDbModel) {
    let admin = &env.services.admin;
    let agent = admin.create_agent(username, "secret").await.unwrap();
    let stream = match admin.create_stream(url).await {
        Ok(stream) => stream,
        Err(Error::Duplicate { .. }) => admin
            .list_streams()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.room_url == url)
            .unwrap(),
        Err(e) => panic!("create_stream failed: {e}"),
    };
    (agent, stream)
}

mod supervisor_tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_assignments_zero_loops() {
        let env = setup().await;
        let mut supervisor = env
            .services
            .supervisor(DetectorSet::from_detectors(Vec::new()));

        let report = supervisor.reconcile().await.unwrap();
        assert!(report.started.is_empty());
        assert_eq!(supervisor.monitor_count(), 0);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shared_url_gets_one_loop() {
        let env = setup().await;
        let url = "https://twitch.tv/shared";
        let (alice, stream) = agent_and_stream(&env, "alice", url).await;
        let (bob, _) = agent_and_stream(&env, "bob", url).await;
        env.services.admin.assign(&alice.id, &stream.id).await.unwrap();
        env.services.admin.assign(&bob.id, &stream.id).await.unwrap();

        let mut supervisor = env
            .services
            .supervisor(DetectorSet::from_detectors(Vec::new()));
        supervisor.reconcile().await.unwrap();

        assert_eq!(supervisor.monitor_count(), 1);
        assert!(supervisor.is_running(url));

        let report = supervisor.shutdown().await;
        assert_eq!(report.total_monitors, 1);
        assert!(report.all_graceful());
    }

    #[tokio::test]
    async fn test_duplicate_assignment_rejected() {
        let env = setup().await;
        let (agent, stream) = agent_and_stream(&env, "carol", "https://kick.com/someone").await;
        env.services.admin.assign(&agent.id, &stream.id).await.unwrap();

        let err = env
            .services
            .admin
            .assign(&agent.id, &stream.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert_eq!(env.services.repos.assignments.count().await.unwrap(), 1);
    }
}

mod monitor_tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_finding_yields_one_event_and_one_notification() {
        let env = setup().await;
        let url = "https://twitch.tv/fixed";
        let detectors = DetectorSet::standard(
            Arc::new(StubDetector {
                category: EventCategory::Visual,
                finding: None,
            }),
            Arc::new(StubDetector {
                category: EventCategory::Audio,
                finding: Some("Keyword 'knife' detected at 1.00s"),
            }),
            Arc::new(StubDetector {
                category: EventCategory::Chat,
                finding: None,
            }),
        );

        let report = monitor(&env, url, detectors).run_cycle().await;
        assert_eq!(report.findings, 1);

        let events = env.services.repos.events.list_for_stream(url, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "audio");
        assert_eq!(events[0].room_url, url);
        assert_eq!(events[0].finding, "Keyword 'knife' detected at 1.00s");

        let violations = env.notifications.wait_for_violations(1).await;
        assert_eq!(violations.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_detectors_record_nothing() {
        let env = setup().await;
        let url = "https://twitch.tv/quiet";
        let detectors = DetectorSet::from_detectors(
            [EventCategory::Visual, EventCategory::Audio, EventCategory::Chat]
                .into_iter()
                .map(|category| {
                    Arc::new(StubDetector {
                        category,
                        finding: None,
                    }) as Arc<dyn Detector>
                })
                .collect(),
        );

        let report = monitor(&env, url, detectors).run_cycle().await;
        assert_eq!(report.findings, 0);
        assert_eq!(report.detectors_run, 3);
        assert_eq!(env.services.repos.events.count().await.unwrap(), 0);
        assert!(env.notifications.wait_for_violations(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_findings_are_not_deduplicated() {
        let env = setup().await;
        let url = "https://twitch.tv/repeat";
        let detectors = DetectorSet::from_detectors(vec![Arc::new(StubDetector {
            category: EventCategory::Visual,
            finding: Some("Flagged object detected: gun"),
        })]);

        let monitor = monitor(&env, url, detectors);
        monitor.run_cycle().await;
        monitor.run_cycle().await;

        assert_eq!(
            env.services.repos.events.count_for_stream(url).await.unwrap(),
            2
        );
        assert_eq!(env.notifications.wait_for_violations(2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_keyword_event_and_payload() {
        let env = setup().await;
        env.services.admin.add_keyword("gun").await.unwrap();
        env.services.admin.add_keyword("knife").await.unwrap();
        env.services.initialize().await.unwrap();

        let url = "https://chaturbate.com/performer";
        let chat = ChatDetector::new(Arc::new(CannedChat(vec!["there is a gun here"])), 20);
        let detectors = DetectorSet::from_detectors(vec![Arc::new(chat)]);

        monitor(&env, url, detectors).run_cycle().await;

        let events = env.services.repos.events.list_for_stream(url, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "chat");
        assert_eq!(events[0].finding, "Chat flagged: gun in 'there is a gun here'");

        let violations = env.notifications.wait_for_violations(1).await;
        assert_eq!(violations.len(), 1);
        let NotificationEvent::ViolationDetected {
            stream_url,
            category,
            finding,
            event_id,
            ..
        } = &violations[0]
        else {
            unreachable!();
        };
        assert_eq!(stream_url, url);
        assert_eq!(*category, EventCategory::Chat);
        assert_eq!(finding, "Chat flagged: gun in 'there is a gun here'");
        assert_eq!(event_id.as_deref(), Some(events[0].id.as_str()));
        assert!(violations[0].message().contains(url));
    }
}
